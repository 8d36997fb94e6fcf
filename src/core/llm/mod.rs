//! LLM Client Module
//!
//! The completion collaborator consumed by the generation pipeline:
//!
//! - `client`: the `CompletionClient` trait (injected, mockable)
//! - `types`: request/response/usage types
//! - `error`: `LLMError` with upstream status where available
//! - `openai`: OpenAI-compatible HTTP implementation

pub mod client;
pub mod error;
pub mod openai;
pub mod types;

pub use client::CompletionClient;
pub use error::{LLMError, Result};
pub use openai::OpenAICompatibleClient;
pub use types::{CompletionRequest, CompletionResponse, ResponseFormat, TokenUsage};

#[cfg(test)]
pub use client::MockCompletionClient;
