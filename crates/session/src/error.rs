//! Session error types.
//!
//! Four kinds of failure reach callers of this crate: bad credentials,
//! rejected input, transport problems, and an expired session. The first
//! three surface to the invoking view for display. An expired session is
//! handled centrally (state reset plus a single redirect to login) and is
//! never surfaced per-request; pending callers simply observe their retried
//! call fail.

use reqwest::StatusCode;
use thiserror::Error;

use orchard_core::EmailError;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backend rejected the presented credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The backend rejected the request input (e.g. duplicate email on
    /// register).
    #[error("{0}")]
    Validation(String),

    /// The request never produced a usable response (network failure,
    /// timeout, or a server-side error status).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The stored credentials could not be renewed; the session is over.
    #[error("session expired")]
    SessionExpired,
}

impl From<EmailError> for SessionError {
    fn from(err: EmailError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl SessionError {
    /// Classify a non-success backend response into the error taxonomy,
    /// consuming the response body for its error message.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Self::Authentication(
                    extract_detail(&body).unwrap_or_else(|| "invalid credentials".to_owned()),
                )
            }
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                Self::Validation(
                    extract_detail(&body).unwrap_or_else(|| "invalid request".to_owned()),
                )
            }
            _ => match response.error_for_status() {
                Err(err) => Self::Transport(err),
                Ok(_) => Self::Validation(format!("unexpected response status {status}")),
            },
        }
    }
}

/// Pull a human-readable message out of a backend error body.
///
/// The backend reports errors either as `{"detail": "..."}` or as
/// per-field validation lists like `{"email": ["already in use"]}`.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    if let Some(detail) = object.get("detail").and_then(serde_json::Value::as_str) {
        return Some(detail.to_owned());
    }

    // Fall back to the first field error
    object.values().find_map(|field| match field {
        serde_json::Value::String(message) => Some(message.clone()),
        serde_json::Value::Array(messages) => messages
            .first()
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned),
        _ => None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_detail_message() {
        let body = r#"{"detail": "No active account found"}"#;
        assert_eq!(
            extract_detail(body),
            Some("No active account found".to_owned())
        );
    }

    #[test]
    fn test_extract_first_field_error() {
        let body = r#"{"email": ["email already in use"]}"#;
        assert_eq!(extract_detail(body), Some("email already in use".to_owned()));
    }

    #[test]
    fn test_extract_detail_unparsable() {
        assert_eq!(extract_detail("<html>502</html>"), None);
        assert_eq!(extract_detail(""), None);
    }

    #[test]
    fn test_email_error_classifies_as_validation() {
        let err = SessionError::from(orchard_core::Email::parse("nope").unwrap_err());
        assert!(matches!(err, SessionError::Validation(_)));
    }
}
