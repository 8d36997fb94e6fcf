//! LLM Error Types
//!
//! Defines error types for completion calls.

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Authentication failed ({status}): {message}")]
    AuthError { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl LLMError {
    /// Upstream HTTP status, where one is known.
    pub fn status(&self) -> Option<u16> {
        match self {
            LLMError::ApiError { status, .. } | LLMError::AuthError { status, .. } => Some(*status),
            LLMError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LLMError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LLMError::Timeout
        } else {
            LLMError::HttpError(err.to_string())
        }
    }
}

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;
