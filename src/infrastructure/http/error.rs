use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Failure of a single API call. Cloneable so poll caches can hold on to the
/// last error alongside the last good value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Scraper is not running: {0}")]
    NotRunning(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(s) if (400..500).contains(&s))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(s) if s >= 500)
    }

    /// Build an error from a non-success response body.
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        ApiError::Http {
            status: status.as_u16(),
            message: error_message(status, body),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(e: url::ParseError) -> Self {
        ApiError::InvalidUrl(e.to_string())
    }
}

/// Pull a human readable message out of an error body. Handles the JSON
/// shapes the backend produces (`message`, `error`, problem details) and
/// falls back to the raw text, then to the status reason.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error", "title", "detail"] {
            if let Some(Value::String(s)) = map.get(key) {
                if !s.trim().is_empty() {
                    return s.clone();
                }
            }
        }
    }

    let text = body.trim();
    if !text.is_empty() && text.len() <= 500 {
        return text.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("Unexpected response")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_prefers_json_fields() {
        let msg = error_message(StatusCode::BAD_REQUEST, r#"{"message": "Name is taken"}"#);
        assert_eq!(msg, "Name is taken");

        let msg = error_message(
            StatusCode::BAD_REQUEST,
            r#"{"type": "x", "title": "One or more validation errors occurred."}"#,
        );
        assert_eq!(msg, "One or more validation errors occurred.");
    }

    #[test]
    fn message_falls_back_to_text_then_reason() {
        assert_eq!(error_message(StatusCode::CONFLICT, "busy"), "busy");
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
    }

    #[test]
    fn status_classification() {
        let not_found = ApiError::from_response(StatusCode::NOT_FOUND, "");
        assert!(not_found.is_not_found());
        assert!(not_found.is_client_error());
        assert!(!not_found.is_server_error());

        let server = ApiError::from_response(StatusCode::BAD_GATEWAY, "");
        assert!(server.is_server_error());
        assert_eq!(server.status(), Some(502));

        assert_eq!(ApiError::Transport("reset".into()).status(), None);
    }
}
