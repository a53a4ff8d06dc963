//! Errors surfaced by the stage API client

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, timeout or transport failure
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// Non-2xx response; `message` is the server's error text when it sent one
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),

    /// No stage configuration exists for the requested identifier
    #[error("no stage configuration for {0}")]
    NotConfigured(String),
}

impl ApiError {
    /// Transient failures are worth retrying on the next tick
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::NotConfigured(_) => false,
        }
    }
}

/// Extract a human readable message from an error body.
///
/// The backend answers with `{"error": "..."}` or `{"detail": "..."}`;
/// anything else is passed through trimmed.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "detail"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_from_json() {
        assert_eq!(error_message(r#"{"error": "No active slides"}"#), "No active slides");
        assert_eq!(error_message(r#"{"detail": "Not found."}"#), "Not found.");
    }

    #[test]
    fn test_error_message_passthrough() {
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(error_message(""), "empty response body");
    }

    #[test]
    fn test_transient_classification() {
        let server = ApiError::Status { status: 503, message: "down".to_string() };
        let client = ApiError::Status { status: 400, message: "bad".to_string() };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!ApiError::NotConfigured("config 1".to_string()).is_transient());
    }
}
