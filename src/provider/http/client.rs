//! HTTP client wrapper for upstream API requests.

use crate::error::Error;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::Serialize;
use std::time::Duration;

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Status and body of a response that made it back over the wire.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
    pub retry_after: Option<u64>,
}

/// HTTP client bound to one base URL and bearer token.
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client. `extra` headers go on every request.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, extra: HeaderMap) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(extra)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Build headers including authentication.
    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let value = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| Error::Config("API key contains invalid header characters".into()))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// GET `path`. Only transport failures are errors; any status comes back.
    pub async fn get(&self, path: &str, timeout: Duration) -> Result<RawResponse, Error> {
        let request = self
            .client
            .get(format!("{}{path}", self.base_url))
            .headers(self.build_headers()?)
            .timeout(timeout);
        Self::execute(request).await
    }

    /// POST a JSON body to `path`. Only transport failures are errors.
    pub async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<RawResponse, Error> {
        let request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .headers(self.build_headers()?)
            .json(body)
            .timeout(timeout);
        Self::execute(request).await
    }

    async fn execute(request: reqwest::RequestBuilder) -> Result<RawResponse, Error> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after_value);
        let body = response.text().await.map_err(transport_error)?;

        Ok(RawResponse {
            status,
            body,
            retry_after,
        })
    }
}

/// Build a header map from name/value pairs, skipping anything invalid.
#[must_use]
pub fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (
            HeaderName::try_from(*name),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = name, "Skipping invalid request header"),
        }
    }
    headers
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transport(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        Error::Transport(format!("Connection failed: {e}"))
    } else {
        Error::Transport(format!("Request failed: {e}"))
    }
}

/// Parse a `Retry-After` header value as seconds.
///
/// Handles integer and fractional seconds (rounds up). HTTP-date values and
/// non-finite numbers return None.
fn parse_retry_after_value(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        Some(secs.max(1))
    } else if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() && f > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Some((f.ceil() as u64).max(1))
        } else {
            None
        }
    } else {
        None
    }
}
