//! Upstream error envelope parsing.

/// Pull a readable message out of an upstream error body.
///
/// Handles the envelopes `OpenRouter` and the providers behind it return:
/// - `{"error": {"message": "...", "code": 429}}`
/// - `{"error": "..."}`
/// - `{"message": "..."}`
///
/// Returns `None` when the body is not JSON or carries no message.
#[must_use]
pub fn upstream_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body.trim()).ok()?;

    if let Some(error) = json.get("error") {
        if let Some(msg) = error.get("message").and_then(|v| v.as_str()) {
            let code = error.get("code").and_then(|c| match c {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            return Some(match code {
                Some(code) => format!("{msg} (code: {code})"),
                None => msg.to_string(),
            });
        }
        if let Some(msg) = error.as_str() {
            return Some(msg.to_string());
        }
    }

    json.get("message")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}

/// Message for a failed response: the envelope message, else a clipped body.
#[must_use]
pub fn describe_failure(body: &str) -> String {
    if let Some(msg) = upstream_message(body) {
        return msg;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "Unknown error".to_string();
    }
    let clipped: String = trimmed.chars().take(200).collect();
    if clipped.len() < trimmed.len() {
        format!("{clipped}...")
    } else {
        clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_message_with_numeric_code() {
        let body = r#"{"error":{"message":"Rate limit exceeded: free-models-per-day","code":429}}"#;
        assert_eq!(
            upstream_message(body).as_deref(),
            Some("Rate limit exceeded: free-models-per-day (code: 429)")
        );
    }

    #[test]
    fn test_nested_message_with_string_code() {
        let body = r#"{"error":{"message":"Invalid key","code":"unauthorized"}}"#;
        assert_eq!(
            upstream_message(body).as_deref(),
            Some("Invalid key (code: unauthorized)")
        );
    }

    #[test]
    fn test_error_as_string() {
        assert_eq!(
            upstream_message(r#"{"error":"No auth credentials found"}"#).as_deref(),
            Some("No auth credentials found")
        );
    }

    #[test]
    fn test_top_level_message() {
        assert_eq!(
            upstream_message(r#"{"message":"Something went wrong"}"#).as_deref(),
            Some("Something went wrong")
        );
    }

    #[test]
    fn test_describe_failure_falls_back_to_body() {
        assert_eq!(describe_failure("<html>Bad Gateway</html>"), "<html>Bad Gateway</html>");
        assert_eq!(describe_failure("   "), "Unknown error");
        let long = "x".repeat(500);
        let described = describe_failure(&long);
        assert_eq!(described.chars().count(), 203);
        assert!(described.ends_with("..."));
    }
}
