//! Regeneration Counter Records

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Which per-adventure budget a regeneration draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationCounter {
    /// Scaffold and movement regenerations
    Scaffold,
    /// Scene expansions and refinements (shared budget)
    Expansion,
}

impl RegenerationCounter {
    /// Column holding this counter in `regeneration_counters`.
    pub fn column(&self) -> &'static str {
        match self {
            RegenerationCounter::Scaffold => "scaffold_used",
            RegenerationCounter::Expansion => "expansion_used",
        }
    }
}

/// Per-adventure regeneration usage
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegenerationCountersRecord {
    pub adventure_id: String,
    pub scaffold_used: i64,
    pub expansion_used: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl RegenerationCountersRecord {
    pub fn new(adventure_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            adventure_id: adventure_id.into(),
            scaffold_used: 0,
            expansion_used: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn used(&self, counter: RegenerationCounter) -> i64 {
        match counter {
            RegenerationCounter::Scaffold => self.scaffold_used,
            RegenerationCounter::Expansion => self.expansion_used,
        }
    }
}
