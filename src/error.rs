use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("OpenRouter API key is not set")]
    NoCredential,

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    UpstreamHttp { status: u16, message: String },

    #[error("Daily limit reached for model {model}: {message}")]
    QuotaExceeded { model: String, message: String },

    #[error("Invalid API response format: {0}")]
    MalformedResponse(String),

    #[error("No suitable vision models available. Check back later.")]
    NoSuitableModels,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a valid image attachment: {0}")]
    InvalidImage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that make every further image in a batch pointless to attempt.
    #[must_use]
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(self, Self::NoCredential)
    }

    /// Failures the generator absorbs before moving on to the next candidate.
    #[must_use]
    pub fn is_candidate_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::UpstreamHttp { .. }
                | Self::QuotaExceeded { .. }
                | Self::MalformedResponse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
