//! Canned collaborators built on the mockall-generated mocks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::generation::{MockContentRetriever, RetrievedContent};
use crate::core::llm::{CompletionRequest, CompletionResponse, LLMError, MockCompletionClient, TokenUsage};

pub const TEST_MODEL: &str = "test-model";

/// Client that answers every completion with `content` and counts calls.
pub fn client_returning(content: &str, calls: Arc<AtomicUsize>) -> MockCompletionClient {
    let content = content.to_string();
    let mut client = MockCompletionClient::new();
    client.expect_model().return_const(TEST_MODEL.to_string());
    client.expect_complete().returning(move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse::new(content.clone(), TEST_MODEL).with_usage(TokenUsage::new(120, 80)))
    });
    client
}

/// Client whose every completion fails with the error built by `make_error`.
pub fn client_failing(make_error: fn() -> LLMError) -> MockCompletionClient {
    let mut client = MockCompletionClient::new();
    client.expect_model().return_const(TEST_MODEL.to_string());
    client.expect_complete().returning(move |_| Err(make_error()));
    client
}

/// Client that records each request it receives before answering.
pub fn client_capturing(
    content: &str,
    seen: Arc<std::sync::Mutex<Vec<CompletionRequest>>>,
) -> MockCompletionClient {
    let content = content.to_string();
    let mut client = MockCompletionClient::new();
    client.expect_model().return_const(TEST_MODEL.to_string());
    client.expect_complete().returning(move |request| {
        seen.lock().unwrap().push(request);
        Ok(CompletionResponse::new(content.clone(), TEST_MODEL))
    });
    client
}

/// Retriever that always returns `candidates`.
pub fn retriever_returning(candidates: Vec<RetrievedContent>) -> MockContentRetriever {
    let mut retriever = MockContentRetriever::new();
    retriever
        .expect_retrieve()
        .returning(move |_| Ok(candidates.clone()));
    retriever
}
