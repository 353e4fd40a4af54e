//! Typed errors for transcript service calls
//!
//! Lets the orchestration layer tell a transient transport failure apart from
//! a definitive server answer. The answer task poller keeps polling through
//! the former and gives up on the latter.

use thiserror::Error;

/// Transcript service errors with typed variants
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, timeout, reset mid-body
    #[error("Network error: {0}")]
    Network(String),

    /// Unknown conversation, task or fingerprint (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request (HTTP 400/422)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Server-side feature disabled, e.g. no metadata repository (HTTP 503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Server-side error (HTTP 5xx)
    #[error("Service error: {0}")]
    ServiceError(String),

    /// Response body did not match the expected shape
    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Check if the failure is worth retrying on the next poll
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::ServiceError(_) | ApiError::Unavailable(_)
        )
    }

    /// Convert HTTP status code and error text into typed ApiError
    pub fn from_http_status(status: reqwest::StatusCode, error_text: String) -> Self {
        let detail = extract_detail(&error_text);
        match status.as_u16() {
            404 => ApiError::NotFound(detail),
            400 | 422 => ApiError::BadRequest(detail),
            503 => ApiError::Unavailable(detail),
            500..=599 => ApiError::ServiceError(detail),
            _ => ApiError::Other(format!("HTTP {}: {}", status, detail)),
        }
    }

    /// Convert network/connection errors into typed ApiError
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            ApiError::Network(format!("Connection failed: {}", e))
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// FastAPI wraps errors as `{"detail": "..."}`; surface just the detail
fn extract_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
