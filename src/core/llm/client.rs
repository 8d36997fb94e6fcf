//! Completion client seam.
//!
//! The orchestrator receives an explicitly constructed client instead of a
//! process-wide instance, so providers can be swapped and mocked.

use async_trait::async_trait;

use super::error::Result;
use super::types::{CompletionRequest, CompletionResponse};

/// Single-shot completion endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier used for completions (recorded with cache entries).
    fn model(&self) -> String;

    /// Run one completion. Timeouts and transport failures surface as errors;
    /// implementations must not retry internally.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
