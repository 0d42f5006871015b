use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the API client.
///
/// `Clone` so that a single refresh failure can be handed to every request
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    BusinessLogic(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage error: {0}")]
    Credentials(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error envelope returned by the dashboard API on failure.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Prefer the server's `error`/`message` field over the raw body.
    fn describe_body(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { error: Some(msg), .. }) | Ok(ErrorBody { message: Some(msg), .. }) => {
                Self::truncate_body(&msg)
            }
            _ => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = Self::describe_body(body);
        match status.as_u16() {
            400 | 422 => ApiError::Validation(detail),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(detail),
            404 => ApiError::NotFound(detail),
            409 => ApiError::BusinessLogic(detail),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::Server(detail),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, detail)),
        }
    }

    /// Whether a caller-level retry policy should try again.
    ///
    /// Transport failures, timeouts, 5xx and 429 are transient. Auth failures
    /// go through the refresh path instead, and local/domain errors never
    /// change on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Timeout(_) | ApiError::Server(_) | ApiError::RateLimited
        )
    }

    /// True when the session can no longer be recovered without logging in again.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ApiError::Network(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            ApiError::Timeout(_) => "Connection timed out. Please try again.".to_string(),
            ApiError::RateLimited => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            ApiError::Server(_) => {
                "The server encountered an error. Please try again later.".to_string()
            }
            ApiError::AccessDenied(_) => {
                "You do not have permission to perform this action.".to_string()
            }
            ApiError::NotFound(_) => "The requested resource was not found.".to_string(),
            ApiError::Validation(msg) | ApiError::BusinessLogic(msg) => msg.clone(),
            ApiError::InvalidResponse(_) | ApiError::Credentials(_) => {
                "An unexpected error occurred.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidResponse(err.to_string())
    }
}
