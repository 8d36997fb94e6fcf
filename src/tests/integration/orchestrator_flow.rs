//! Happy-path orchestration: billing, caching, counters and prompts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::GenerationConfig;
use crate::core::credits::OperationKind;
use crate::core::generation::{
    ContentKind, GenerationError, GenerationOrchestrator, GenerationOutput, GenerationRequest, RetrievedContent,
    SceneType, Tier,
};
use crate::core::llm::{MockCompletionClient, ResponseFormat};
use crate::database::{CreditOps, Database, TransactionKind};
use crate::tests::common::*;
use crate::tests::mocks::*;

fn orchestrator(db: &Database, client: MockCompletionClient) -> GenerationOrchestrator {
    GenerationOrchestrator::from_config(db.clone(), Arc::new(client), &GenerationConfig::default())
}

#[tokio::test]
async fn test_scaffold_consumes_one_credit_and_creates_counters() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 5).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning(SCAFFOLD_JSON, calls.clone()));

    let generated = orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap();

    assert!(!generated.cache_hit);
    assert_eq!(generated.credits_remaining, 4);
    assert_eq!(generated.output.scaffold.title, "The Hollow Crown");
    assert_eq!(generated.output.scaffold.movements.len(), 3);
    assert!(generated.output.regeneration.is_none());
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let usage = orchestrator.governor().usage(&generated.output.adventure_id).await.unwrap();
    assert_eq!((usage.scaffold.used, usage.expansion.used), (0, 0));
    assert!(db
        .get_credit_balance("user-1")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_identical_scaffolds_hit_cache_but_are_both_billed() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 5).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning(SCAFFOLD_JSON, calls.clone()));

    let first = orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap();
    let second = orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.output.scaffold, first.output.scaffold);
    assert_ne!(second.output.adventure_id, first.output.adventure_id);
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 3);

    let stats = orchestrator.cache().stats().await.unwrap();
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.total_accesses, 2);
    assert_eq!(stats.total_tokens, 200);
}

#[tokio::test]
async fn test_cache_is_shared_across_users() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 1).await;
    fund(&db, "user-2", 1).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning(SCAFFOLD_JSON, calls.clone()));

    orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap();
    let other = orchestrator.generate_scaffold(scaffold_params("user-2")).await.unwrap();

    assert!(other.cache_hit);
    assert_eq!(other.credits_remaining, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scaffold_regenerations_stop_at_ten() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 12).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning(SCAFFOLD_JSON, calls.clone()));

    let created = orchestrator.generate_scaffold(scaffold_params("user-1")).await.unwrap();
    let adventure_id = created.output.adventure_id;

    for expected in 1..=10u32 {
        let mut params = scaffold_params("user-1");
        params.adventure_id = Some(adventure_id.clone());
        let regenerated = orchestrator.generate_scaffold(params).await.unwrap();
        let usage = regenerated.output.regeneration.unwrap();
        assert_eq!(usage.used, expected);
        // Each regeneration slot is a distinct cache key
        assert!(!regenerated.cache_hit);
    }

    let mut params = scaffold_params("user-1");
    params.adventure_id = Some(adventure_id.clone());
    let err = orchestrator.generate_scaffold(params).await.unwrap_err();

    assert!(matches!(err, GenerationError::RegenerationLimitReached { limit: 10, .. }));
    assert!(err.to_string().contains("Scaffold regeneration limit reached"));
    assert!(err.to_string().contains("10"));
    assert!(err.is_user_facing());
    // Limit failures happen before any credit is touched
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 11);
}

#[tokio::test]
async fn test_first_expansion_is_free_of_budget_but_regeneration_is_not() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 5).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning(EXPANSION_TEXT, calls.clone()));
    orchestrator.governor().initialize("adv-1").await.unwrap();

    let first = orchestrator.expand_scene(expansion_params("user-1", "adv-1")).await.unwrap();
    assert_eq!(first.output.content, EXPANSION_TEXT);
    assert_eq!(first.output.scene_id, "scene-1");
    assert!(first.output.regeneration.is_none());

    let mut again = expansion_params("user-1", "adv-1");
    again.regenerate = true;
    let second = orchestrator.expand_scene(again).await.unwrap();

    assert_eq!(second.output.regeneration.unwrap().used, 1);
    assert!(!second.cache_hit);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let usage = orchestrator.governor().usage("adv-1").await.unwrap();
    assert_eq!((usage.scaffold.used, usage.expansion.used), (0, 1));
}

#[tokio::test]
async fn test_refinements_share_the_expansion_budget() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 5).await;
    let config = GenerationConfig {
        expansion_regeneration_limit: 2,
        ..GenerationConfig::default()
    };
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator =
        GenerationOrchestrator::from_config(db.clone(), Arc::new(client_returning(EXPANSION_TEXT, calls)), &config);

    let mut regen = expansion_params("user-1", "adv-1");
    regen.regenerate = true;
    orchestrator.expand_scene(regen).await.unwrap();

    let refined = orchestrator.refine_content(refinement_params("user-1", "adv-1")).await.unwrap();
    assert_eq!(refined.output.regeneration.used, 2);
    assert_eq!(refined.output.regeneration.remaining, 0);

    let err = orchestrator
        .refine_content(refinement_params("user-1", "adv-1"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("manual editing"));
    assert!(err.to_string().contains('2'));
    assert_eq!(orchestrator.get_user_credits("user-1").await.unwrap(), 3);
}

#[tokio::test]
async fn test_movement_regeneration_counts_against_scaffold_budget() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 2).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning(MOVEMENT_JSON, calls));

    let generated = orchestrator
        .regenerate_movement(movement_params("user-1", "adv-7"))
        .await
        .unwrap();

    assert_eq!(generated.output.movement_id, "m-2");
    assert_eq!(generated.output.movement.title, "Ferry of Ash");
    assert_eq!(generated.output.movement.scene_type, SceneType::Exploration);
    assert_eq!(generated.output.regeneration.used, 1);

    let usage = orchestrator.governor().usage("adv-7").await.unwrap();
    assert_eq!(usage.scaffold.used, 1);

    let history = orchestrator.ledger().transactions("user-1", 1).await.unwrap();
    assert_eq!(history[0].transaction_kind(), Some(TransactionKind::Consumption));
    assert_eq!(history[0].credit_type, "movement_regeneration");
}

#[tokio::test]
async fn test_expansion_prompt_uses_scene_temperature_and_candidates() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 2).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let retriever = retriever_returning(vec![
        RetrievedContent {
            kind: ContentKind::Adversary,
            name: "Bramble Knight".into(),
            tier: Tier(2),
            summary: "Thorned armor animated by rot".into(),
            score: 0.91,
        },
        RetrievedContent {
            kind: ContentKind::Adversary,
            name: "Elder Treant".into(),
            tier: Tier(4),
            summary: "Too strong for this party".into(),
            score: 0.99,
        },
    ]);
    let orchestrator = orchestrator(&db, client_capturing(EXPANSION_TEXT, seen.clone()))
        .with_retriever(Arc::new(retriever));

    orchestrator.expand_scene(expansion_params("user-1", "adv-1")).await.unwrap();

    let requests = seen.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.temperature, 0.5);
    assert_eq!(request.response_format, ResponseFormat::Text);
    assert!(request.system_prompt.contains("The Witherwild"));
    assert!(request.user_prompt.contains("Bramble Knight (tier 2)"));
    assert!(!request.user_prompt.contains("Elder Treant"));
    assert!(request.user_prompt.contains("Next scene:\n- The Sap Court [social]"));
}

#[tokio::test]
async fn test_generate_dispatches_by_kind() {
    let (db, _temp) = create_test_db().await;
    fund(&db, "user-1", 1).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&db, client_returning(SCAFFOLD_JSON, calls));

    let generated = orchestrator
        .generate(GenerationRequest::Scaffold(scaffold_params("user-1")))
        .await
        .unwrap();

    assert!(matches!(generated.output, GenerationOutput::Scaffold(_)));
    assert!(!orchestrator
        .check_credit_sufficiency("user-1", OperationKind::SceneExpansion)
        .await
        .unwrap());
}
