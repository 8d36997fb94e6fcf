//! Test Fixtures
//!
//! Temporary databases, funded users and sample requests.

use tempfile::TempDir;

use crate::core::credits::{CreditLedger, CreditSource};
use crate::core::generation::{
    Difficulty, MovementRegenerationParams, Party, RefinementParams, ScaffoldParams, SceneExpansionParams,
    SceneSummary, SceneType,
};
use crate::database::Database;

// =============================================================================
// Database Fixtures
// =============================================================================

/// Create a test database in a temporary directory.
/// Returns both the database and the TempDir (which must be kept alive).
pub async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db = Database::new(temp_dir.path())
        .await
        .expect("Failed to create test database");
    (db, temp_dir)
}

/// Grant `credits` to `user_id`.
pub async fn fund(db: &Database, user_id: &str, credits: i64) {
    CreditLedger::new(db.clone())
        .add_credits(user_id, credits, CreditSource::Grant { reason: "test fixture".into() })
        .await
        .expect("Failed to fund test user");
}

/// Install a trigger that aborts every insert into `table` matching `when`.
pub async fn fail_inserts(db: &Database, table: &str, when: &str) {
    let sql = format!(
        "CREATE TRIGGER fail_{table}_insert BEFORE INSERT ON {table} WHEN {when} \
         BEGIN SELECT RAISE(ABORT, 'injected failure'); END"
    );
    sqlx::query(&sql)
        .execute(db.pool())
        .await
        .expect("Failed to install failure trigger");
}

pub async fn cache_entry_count(db: &Database) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM llm_cache")
        .fetch_one(db.pool())
        .await
        .expect("Failed to count cache entries")
}

// =============================================================================
// Request Fixtures
// =============================================================================

pub const SCAFFOLD_JSON: &str = r#"{
    "title": "The Hollow Crown",
    "description": "A blighted grove hides a stolen crown.",
    "movements": [
        {"title": "Thorn Gate", "scene_type": "combat", "description": "Knights of bramble bar the way."},
        {"title": "The Sap Court", "scene_type": "social", "description": "Bargain with the dryad court."},
        {"title": "Root Vault", "scene_type": "puzzle", "description": "The crown sleeps behind living locks."}
    ]
}"#;

pub const MOVEMENT_JSON: &str =
    r#"{"title": "Ferry of Ash", "scene_type": "exploration", "description": "Cross the cinder river by night."}"#;

pub const EXPANSION_TEXT: &str = "## Thorn Gate\n\nThe bramble knights lower their lances as you approach.";

pub fn scene(id: &str, title: &str, scene_type: SceneType) -> SceneSummary {
    SceneSummary::new(id, title, scene_type, format!("{title} unfolds."))
}

pub fn scaffold_params(user_id: &str) -> ScaffoldParams {
    ScaffoldParams {
        user_id: user_id.into(),
        adventure_id: None,
        frame: "The Witherwild".into(),
        focus: "recover the Hollow Crown".into(),
        party: Party::new(4, 3),
        difficulty: Difficulty::Standard,
        stakes: "the grove dies by winter".into(),
    }
}

pub fn expansion_params(user_id: &str, adventure_id: &str) -> SceneExpansionParams {
    SceneExpansionParams {
        user_id: user_id.into(),
        adventure_id: adventure_id.into(),
        frame: "The Witherwild".into(),
        party: Party::new(4, 3),
        difficulty: Difficulty::Standard,
        scene: scene("scene-1", "Thorn Gate", SceneType::Combat),
        previous_scene: None,
        next_scene: Some(scene("scene-2", "The Sap Court", SceneType::Social)),
        regenerate: false,
    }
}

pub fn refinement_params(user_id: &str, adventure_id: &str) -> RefinementParams {
    RefinementParams {
        user_id: user_id.into(),
        adventure_id: adventure_id.into(),
        frame: "The Witherwild".into(),
        scene: scene("scene-2", "The Sap Court", SceneType::Social),
        current_content: "The dryad queen listens.".into(),
        instruction: "Make the queen openly hostile".into(),
        previous_scene: Some(scene("scene-1", "Thorn Gate", SceneType::Combat)),
        next_scene: None,
    }
}

pub fn movement_params(user_id: &str, adventure_id: &str) -> MovementRegenerationParams {
    MovementRegenerationParams {
        user_id: user_id.into(),
        adventure_id: adventure_id.into(),
        frame: "Age of Umbra".into(),
        focus: "escort a lantern-bearer".into(),
        party: Party::new(3, 5),
        difficulty: Difficulty::Hard,
        stakes: "the last light goes out".into(),
        movement: scene("m-2", "Drowned Bridge", SceneType::Combat),
        locked_movements: vec![scene("m-1", "Lantern Vigil", SceneType::Social)],
    }
}
