//! Error types for backend calls.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a call against the chat backend.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport failure: connection refused, timeout, TLS and the like.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend rejected the credential and no refresh was attempted
    /// (or the single retry was rejected as well).
    #[error("Unauthorized")]
    Unauthorized,

    /// The backend answered with a non-success status other than 401.
    #[error("HTTP error ({status}): {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("Unexpected response: {0}")]
    Schema(String),

    /// Refreshing the access token failed; stored credentials were discarded
    /// and the user must log in again.
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// The configured base URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// True when the caller should send the user back to the login view.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// HTTP status associated with the failure, when there is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            ApiError::Http { status, .. } => StatusCode::from_u16(*status).ok(),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Short text suitable for an inline notice or an error bubble.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Could not reach the server. Check your connection.".to_string(),
            ApiError::Unauthorized => "Not authorized.".to_string(),
            ApiError::Http { status, message } => match summarize_body(message) {
                Some(summary) => format!("Server error ({status}): {summary}"),
                None => format!("Server error ({status})."),
            },
            ApiError::Schema(_) => "The server sent an unexpected response.".to_string(),
            ApiError::SessionExpired => self.to_string(),
            ApiError::InvalidUrl(e) => format!("Invalid server URL: {e}"),
        }
    }
}

const BODY_SUMMARY_CHARS: usize = 120;

/// First line of an error body, shortened. Markup (an HTML error page) and
/// blank bodies yield `None`.
fn summarize_body(body: &str) -> Option<String> {
    let line = body.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.starts_with('<') {
        return None;
    }
    if line.chars().count() <= BODY_SUMMARY_CHARS {
        return Some(line.to_string());
    }
    let cut: String = line.chars().take(BODY_SUMMARY_CHARS).collect();
    Some(format!("{}...", cut.trim_end()))
}

/// Result type alias for backend calls.
pub type Result<T> = std::result::Result<T, ApiError>;
