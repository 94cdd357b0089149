//! Upstream vision-model API.
//!
//! The core only talks to the upstream through [`VisionApi`]: list the model
//! catalog and run one chat completion. [`OpenRouterClient`] is the production
//! implementation.

mod error;
pub mod http;
mod openrouter;
mod types;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use error::{describe_failure, upstream_message};
pub use openrouter::OpenRouterClient;
pub use types::*;

/// Default `OpenRouter` API root.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
/// Timeout for the models listing.
pub const MODELS_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for a completion. Vision inference is slow and runs in the background.
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait VisionApi: Send + Sync {
    /// Whether a credential is configured. No request is made without one.
    fn has_credential(&self) -> bool;

    /// Raw model objects from the listing endpoint's `data` array.
    ///
    /// Errors: `NoCredential`, `Transport`, `UpstreamHttp`, `MalformedResponse`.
    async fn list_models(&self) -> Result<Vec<serde_json::Value>>;

    /// Run one completion and return the raw 2xx body.
    ///
    /// Errors: `NoCredential`, `Transport`, `QuotaExceeded` (429) and
    /// `UpstreamHttp` for every other non-2xx status.
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}
