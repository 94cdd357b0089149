//! `OpenRouter` implementation of [`VisionApi`].

use super::http::{HttpClient, RawResponse, header_map};
use super::{COMPLETION_TIMEOUT, ChatRequest, MODELS_TIMEOUT, VisionApi, describe_failure};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;

pub struct OpenRouterClient {
    http: Option<HttpClient>,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("http", &self.http)
            .finish()
    }
}

impl OpenRouterClient {
    /// `api_key: None` (or blank) builds a client that refuses every call with
    /// `NoCredential` before touching the network.
    #[must_use]
    pub fn new(api_key: Option<String>, base_url: &str, referer: Option<&str>, title: &str) -> Self {
        let http = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|key| {
                let mut pairs = vec![("X-Title", title)];
                if let Some(referer) = referer {
                    pairs.push(("HTTP-Referer", referer));
                }
                HttpClient::new(base_url, key, header_map(&pairs))
            });
        Self { http }
    }

    fn http(&self) -> Result<&HttpClient> {
        self.http.as_ref().ok_or(Error::NoCredential)
    }
}

#[async_trait]
impl VisionApi for OpenRouterClient {
    fn has_credential(&self) -> bool {
        self.http.is_some()
    }

    async fn list_models(&self) -> Result<Vec<serde_json::Value>> {
        let response = self.http()?.get("/models", MODELS_TIMEOUT).await?;
        if !response.status.is_success() {
            return Err(Error::UpstreamHttp {
                status: response.status.as_u16(),
                message: describe_failure(&response.body),
            });
        }
        parse_models_body(&response.body)
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        tracing::debug!(model = %request.model, "Sending completion request");
        let response = self
            .http()?
            .post_json("/chat/completions", request, COMPLETION_TIMEOUT)
            .await?;
        classify_completion(&request.model, response)
    }
}

/// Validate the listing shape: a top-level `data` array of model objects.
fn parse_models_body(body: &str) -> Result<Vec<serde_json::Value>> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::MalformedResponse(format!("models listing is not JSON: {e}")))?;
    let Some(data) = json.get("data").and_then(|d| d.as_array()) else {
        return Err(Error::MalformedResponse(
            "models listing has no `data` array".to_string(),
        ));
    };
    let total = data.len();
    let models: Vec<serde_json::Value> = data.iter().filter(|m| m.is_object()).cloned().collect();
    if models.len() < total {
        tracing::warn!(
            dropped = total - models.len(),
            "Ignoring non-object entries in models listing"
        );
    }
    Ok(models)
}

fn classify_completion(model: &str, response: RawResponse) -> Result<String> {
    let status = response.status;
    if status.is_success() {
        return Ok(response.body);
    }

    let message = describe_failure(&response.body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(
            model,
            retry_after = ?response.retry_after,
            "Model is exhausted (rate limited)"
        );
        return Err(Error::QuotaExceeded {
            model: model.to_string(),
            message,
        });
    }

    tracing::warn!(model, status = status.as_u16(), %message, "Completion failed");
    Err(Error::UpstreamHttp {
        status: status.as_u16(),
        message,
    })
}
