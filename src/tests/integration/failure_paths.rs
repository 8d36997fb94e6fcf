//! Failure handling: refunds, non-fatal cache writes and reconciliation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Level;

use crate::config::GenerationConfig;
use crate::core::generation::{
    ContentRetriever, GenerationError, GenerationOrchestrator, RetrievalError, RetrievalQuery, RetrievedContent,
    UpstreamFailure,
};
use crate::core::llm::{LLMError, MockCompletionClient};
use crate::core::logging::RECONCILIATION_TARGET;
use crate::database::{Database, TransactionKind};
use crate::tests::common::*;
use crate::tests::mocks::*;

fn orchestrator(db: &Database, client: MockCompletionClient) -> GenerationOrchestrator {
    GenerationOrchestrator::from_config(db.clone(), Arc::new(client), &GenerationConfig::default())
}

struct UnavailableSearch;

#[async_trait]
impl ContentRetriever for UnavailableSearch {
    async fn retrieve(&self, _query: RetrievalQuery) -> Result<Vec<RetrievedContent>, RetrievalError> {
        Err(RetrievalError::Unavailable("index offline".into()))
    }
}

#[tokio::test]
async fn test_insufficient_credits_touches_nothing() {
    let (db, _temp) = create_test_db().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning(SCAFFOLD_JSON, calls.clone()));

    let err = orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap_err();

    assert!(matches!(err, GenerationError::InsufficientCredits { required: 1, available: 0 }));
    assert!(err.is_user_facing());
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 0);
    assert_eq!(cache_entry_count(&db).await, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_upstream_failure_refunds_credit() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 5).await;
    let orchestrator = orchestrator(&db, client_failing(|| LLMError::RateLimited { retry_after_secs: 20 }));

    let err = orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap_err();

    assert!(matches!(
        err,
        GenerationError::UpstreamGeneration { failure: UpstreamFailure::RateLimited, status: Some(429), .. }
    ));
    assert!(err.is_retryable());
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 5);

    let history = orchestrator.ledger().transactions("user-1", 2).await.unwrap();
    assert_eq!(history[0].transaction_kind(), Some(TransactionKind::Refund));
    assert_eq!(history[1].transaction_kind(), Some(TransactionKind::Consumption));
}

#[tokio::test]
async fn test_timeout_refunds_without_retrying() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 1).await;
    let mut client = MockCompletionClient::new();
    client.expect_model().return_const(TEST_MODEL.to_string());
    client.expect_complete().times(1).returning(|_| Err(LLMError::Timeout));
    let orchestrator = orchestrator(&db, client);

    let err = orchestrator
        .expand_scene(expansion_params("user-1", "adv-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::UpstreamGeneration { failure: UpstreamFailure::Timeout, .. }));
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_malformed_response_refunds_and_is_not_cached() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 5).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning("Here is a great adventure! Enjoy.", calls));

    let err = orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap_err();

    assert!(matches!(err, GenerationError::MalformedResponse(_)));
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 5);
    assert_eq!(cache_entry_count(&db).await, 0);
}

#[tokio::test]
async fn test_regeneration_count_survives_failed_generation() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 3).await;
    let orchestrator = orchestrator(
        &db,
        client_failing(|| LLMError::ApiError { status: 503, message: "overloaded".into() }),
    );

    let err = orchestrator
        .regenerate_movement(movement_params("user-1", "adv-1"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 3);
    let usage = orchestrator.governor().usage("adv-1").await.unwrap();
    assert_eq!(usage.scaffold.used, 1);
}

#[tokio::test]
async fn test_retrieval_failure_is_upstream_failure() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 2).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning("unused", calls.clone()))
        .with_retriever(Arc::new(UnavailableSearch));

    let err = orchestrator
        .expand_scene(expansion_params("user-1", "adv-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::UpstreamGeneration { failure: UpstreamFailure::Retrieval, .. }));
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cache_lookup_failure_refunds() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 2).await;
    sqlx::query("DROP TABLE llm_cache").execute(db.pool()).await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning(SCAFFOLD_JSON, calls.clone()));

    let err = orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap_err();

    assert!(matches!(err, GenerationError::Storage(_)));
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cache_store_failure_is_not_fatal() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 2).await;
    fail_inserts(&db, "llm_cache", "1").await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning(SCAFFOLD_JSON, calls));

    let generated = orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap();

    assert_eq!(generated.output.scaffold.title, "The Hollow Crown");
    assert_eq!(generated.credits_remaining, 1);
    assert_eq!(cache_entry_count(&db).await, 0);
}

#[tokio::test]
async fn test_failed_refund_still_returns_original_error() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 5).await;
    fail_inserts(&db, "credit_transactions", "NEW.kind = 'refund'").await;
    let orchestrator = orchestrator(&db, client_failing(|| LLMError::HttpError("connection reset".into())));
    let (events, _guard) = CapturedEvents::install();

    let err = orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap_err();

    assert!(matches!(err, GenerationError::UpstreamGeneration { failure: UpstreamFailure::Network, .. }));
    assert_eq!(events.count(RECONCILIATION_TARGET, Level::ERROR), 1);
    // Refund was rolled back as a unit: the credit stays consumed until reconciled
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 4);
    let history = orchestrator.ledger().transactions("user-1", 10).await.unwrap();
    assert!(history
        .iter()
        .all(|t| t.transaction_kind() != Some(TransactionKind::Refund)));
}
