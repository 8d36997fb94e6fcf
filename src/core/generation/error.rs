//! Generation Error Taxonomy
//!
//! Component errors are classified here into what the caller can act on.

use serde::{Deserialize, Serialize};

use super::parse::ParseError;
use super::retrieval::RetrievalError;
use crate::core::cache::CacheError;
use crate::core::credits::LedgerError;
use crate::core::llm::LLMError;
use crate::core::regeneration::GovernorError;

/// Which upstream collaborator failed, and how
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamFailure {
    RateLimited,
    Auth,
    Timeout,
    Network,
    Api,
    NotConfigured,
    Retrieval,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("{message}")]
    RegenerationLimitReached { limit: u32, message: String },

    #[error("Credit ledger busy, try again: {0}")]
    LedgerWriteConflict(String),

    #[error("Credit ledger failure: {0}")]
    LedgerStorage(String),

    #[error("Generation failed ({failure:?}): {message}")]
    UpstreamGeneration {
        failure: UpstreamFailure,
        status: Option<u16>,
        retry_after_secs: Option<u64>,
        message: String,
    },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl GenerationError {
    /// Errors the end user should see verbatim.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            GenerationError::InvalidRequest(_)
                | GenerationError::InsufficientCredits { .. }
                | GenerationError::RegenerationLimitReached { .. }
        )
    }

    /// Errors worth one more attempt from the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::LedgerWriteConflict(_) => true,
            GenerationError::UpstreamGeneration { failure, .. } => matches!(
                failure,
                UpstreamFailure::RateLimited | UpstreamFailure::Timeout | UpstreamFailure::Network
            ),
            _ => false,
        }
    }

    /// Upstream HTTP status, where one is known.
    pub fn status(&self) -> Option<u16> {
        match self {
            GenerationError::UpstreamGeneration { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<LLMError> for GenerationError {
    fn from(err: LLMError) -> Self {
        let status = err.status();
        let (failure, retry_after_secs) = match &err {
            LLMError::RateLimited { retry_after_secs } => (UpstreamFailure::RateLimited, Some(*retry_after_secs)),
            LLMError::AuthError { .. } => (UpstreamFailure::Auth, None),
            LLMError::Timeout => (UpstreamFailure::Timeout, None),
            LLMError::HttpError(_) => (UpstreamFailure::Network, None),
            LLMError::NotConfigured(_) => (UpstreamFailure::NotConfigured, None),
            LLMError::ApiError { .. } | LLMError::InvalidResponse(_) | LLMError::SerializationError(_) => {
                (UpstreamFailure::Api, None)
            }
        };
        GenerationError::UpstreamGeneration {
            failure,
            status,
            retry_after_secs,
            message: err.to_string(),
        }
    }
}

impl From<RetrievalError> for GenerationError {
    fn from(err: RetrievalError) -> Self {
        GenerationError::UpstreamGeneration {
            failure: UpstreamFailure::Retrieval,
            status: None,
            retry_after_secs: None,
            message: err.to_string(),
        }
    }
}

impl From<LedgerError> for GenerationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCredits { required, available } => {
                GenerationError::InsufficientCredits { required, available }
            }
            LedgerError::InvalidAmount(amount) => {
                GenerationError::InvalidRequest(format!("invalid credit amount {amount}"))
            }
            LedgerError::WriteConflict(msg) => GenerationError::LedgerWriteConflict(msg),
            LedgerError::Storage(msg) => GenerationError::LedgerStorage(msg),
        }
    }
}

impl From<GovernorError> for GenerationError {
    fn from(err: GovernorError) -> Self {
        match err {
            GovernorError::LimitReached { limit, message } => {
                GenerationError::RegenerationLimitReached { limit, message }
            }
            GovernorError::Storage(msg) => GenerationError::Storage(msg),
        }
    }
}

impl From<CacheError> for GenerationError {
    fn from(err: CacheError) -> Self {
        GenerationError::Storage(err.to_string())
    }
}

impl From<ParseError> for GenerationError {
    fn from(err: ParseError) -> Self {
        GenerationError::MalformedResponse(err.to_string())
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;
