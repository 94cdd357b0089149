use crate::provider::DEFAULT_BASE_URL;
use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable that overrides `api_key` from the file.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// Suggestions wait for review.
    #[default]
    Manual,
    /// Suggestions are applied as soon as they are generated.
    Auto,
}

/// How many images one scan may process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSize {
    Count(usize),
    All,
}

impl Default for BatchSize {
    fn default() -> Self {
        Self::Count(20)
    }
}

impl fmt::Display for BatchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::All => f.write_str("all"),
        }
    }
}

impl FromStr for BatchSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        match s.parse::<usize>() {
            Ok(0) => Err("batch size must be at least 1".to_string()),
            Ok(n) => Ok(Self::Count(n)),
            Err(_) => Err(format!("invalid batch size '{s}', expected a number or \"all\"")),
        }
    }
}

impl Serialize for BatchSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Count(n) => serializer.serialize_u64(*n as u64),
            Self::All => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for BatchSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => n.to_string().parse(),
            Raw::Text(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// `"free"` for the ranked free pool, or a model id tried first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelSelection {
    #[default]
    Free,
    Pinned(String),
}

impl ModelSelection {
    /// Override passed to the generator, if any.
    #[must_use]
    pub fn pinned(&self) -> Option<&str> {
        match self {
            Self::Free => None,
            Self::Pinned(id) => Some(id),
        }
    }
}

impl From<String> for ModelSelection {
    fn from(value: String) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("free") {
            Self::Free
        } else {
            Self::Pinned(value.to_string())
        }
    }
}

impl From<ModelSelection> for String {
    fn from(value: ModelSelection) -> Self {
        match value {
            ModelSelection::Free => "free".to_string(),
            ModelSelection::Pinned(id) => id,
        }
    }
}

/// Site details folded into every prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub description: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub mode: OperationMode,
    pub batch_size: BatchSize,
    /// Wall-clock budget per scan. 0 means unbounded.
    pub max_runtime_minutes: u64,
    /// Pause after each successful generation.
    pub request_delay_secs: u64,
    pub model: ModelSelection,
    pub custom_instructions: Option<String>,
    /// Informational only; scans are triggered by an external scheduler.
    pub schedule_frequency: String,
    pub site: SiteConfig,
    pub data_dir: PathBuf,
    /// Sent as `HTTP-Referer` so the upstream can attribute usage.
    pub http_referer: Option<String>,
    /// Sent as `X-Title`.
    pub app_title: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|d| d.join("altgen"))
            .unwrap_or_else(|| PathBuf::from(".altgen"));

        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            mode: OperationMode::default(),
            batch_size: BatchSize::default(),
            max_runtime_minutes: 10,
            request_delay_secs: 2,
            model: ModelSelection::default(),
            custom_instructions: None,
            schedule_frequency: "daily".to_string(),
            site: SiteConfig::default(),
            data_dir,
            http_referer: None,
            app_title: format!("altgen (v{})", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Default location of `config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("altgen").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".altgen/config.toml"))
    }

    /// Load from `path` (or the default location), then apply the
    /// environment override. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Invalid config file {}", config_path.display()))?
        } else {
            if path.is_some() {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            Self::default()
        };

        config.override_api_key(std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Replace the file's key with `key` when it is non-blank.
    pub fn override_api_key(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
    }

    /// Configured key, if non-blank.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToString::to_string)
    }

    /// Path to the `SQLite` database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("altgen.db")
    }

    /// Scan budget, `None` when unbounded.
    #[must_use]
    pub fn max_runtime(&self) -> Option<Duration> {
        (self.max_runtime_minutes > 0)
            .then(|| Duration::from_secs(self.max_runtime_minutes.saturating_mul(60)))
    }

    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs)
    }

    /// Custom instructions, if non-blank.
    #[must_use]
    pub fn instructions(&self) -> Option<&str> {
        self.custom_instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
