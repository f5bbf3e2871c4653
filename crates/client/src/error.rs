use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Missing or rejected credential. Callers force a logout.
    #[error("{0}")]
    Auth(String),
    /// Input rejected by the client or the backend. Shown inline, no state change.
    #[error("{0}")]
    Validation(String),
    /// Connection failure, timeout or 5xx. Only the cache layer retries these.
    #[error("{0}")]
    TransientNetwork(String),
    /// Rendered as an empty state rather than an error banner.
    #[error("{0}")]
    NotFound(String),
    /// A control or workflow already has a request in flight.
    #[error("{0}")]
    Busy(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Maps a non-success HTTP status and its normalized message to the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ClientError::Auth(message),
            404 => ClientError::NotFound(message),
            408 | 429 | 500..=599 => ClientError::TransientNetwork(message),
            _ => ClientError::Validation(message),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::TransientNetwork(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ClientError::Decode(err.to_string());
        }
        if err.is_builder() {
            return ClientError::Validation(err.to_string());
        }
        if let Some(status) = err.status() {
            return ClientError::from_status(status.as_u16(), err.to_string());
        }
        ClientError::TransientNetwork(err.to_string())
    }
}

/// Turns a backend error body into one human-readable line.
///
/// Checked in order: a `detail` field, a `message` field, a plain-string
/// body. The first one present wins; otherwise `fallback` is used.
pub fn normalize_error_message(body: &str, fallback: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            if let Some(detail) = value.get("detail").and_then(field_text) {
                return detail;
            }
            if let Some(message) = value.get("message").and_then(field_text) {
                return message;
            }
            match value {
                Value::String(text) if !text.trim().is_empty() => text,
                _ => fallback.to_string(),
            }
        }
        Err(_) => trimmed.to_string(),
    }
}

fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "request failed with status 500";

    #[test]
    fn detail_wins_over_message() {
        let body = r#"{"detail": "model offline", "message": "ignored"}"#;
        assert_eq!(normalize_error_message(body, FALLBACK), "model offline");
    }

    #[test]
    fn message_used_without_detail() {
        let body = r#"{"message": "invalid id", "code": "invalid_input"}"#;
        assert_eq!(normalize_error_message(body, FALLBACK), "invalid id");
    }

    #[test]
    fn plain_text_body_is_kept() {
        assert_eq!(
            normalize_error_message("file too large (max 10MB)\n", FALLBACK),
            "file too large (max 10MB)"
        );
        assert_eq!(normalize_error_message(r#""quoted""#, FALLBACK), "quoted");
    }

    #[test]
    fn structured_detail_is_rendered() {
        let body = r#"{"detail": [{"loc": ["body"], "msg": "field required"}]}"#;
        let message = normalize_error_message(body, FALLBACK);
        assert!(message.contains("field required"));
    }

    #[test]
    fn falls_back_when_nothing_readable() {
        assert_eq!(normalize_error_message("", FALLBACK), FALLBACK);
        assert_eq!(normalize_error_message(r#"{"code": 7}"#, FALLBACK), FALLBACK);
        assert_eq!(normalize_error_message(r#"{"detail": null}"#, FALLBACK), FALLBACK);
    }

    #[test]
    fn statuses_map_to_taxonomy() {
        assert!(ClientError::from_status(401, "x").is_auth());
        assert!(ClientError::from_status(403, "x").is_auth());
        assert!(ClientError::from_status(404, "x").is_not_found());
        assert!(ClientError::from_status(503, "x").is_transient());
        assert!(ClientError::from_status(429, "x").is_transient());
        assert_eq!(
            ClientError::from_status(422, "bad amount"),
            ClientError::Validation("bad amount".to_string())
        );
    }
}
