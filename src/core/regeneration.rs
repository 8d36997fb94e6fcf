//! Regeneration Governor
//!
//! Per-adventure ceilings on regeneration calls. Scaffold and movement
//! regenerations share the scaffold budget; scene expansions and
//! refinements share the expansion budget. Counters only ever go up: a
//! regeneration whose generation later fails still counts, independent of
//! any credit refund.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::credits::is_write_conflict;
use crate::database::{Database, RegenerationCounter, RegenerationOps};

/// Scaffold regenerations allowed per adventure
pub const SCAFFOLD_REGENERATION_LIMIT: u32 = 10;

/// Expansion and refinement calls allowed per adventure
pub const EXPANSION_REGENERATION_LIMIT: u32 = 20;

/// Which guidance the limit message should give for the expansion budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionGuidance {
    /// Scene expansion: lock the parts worth keeping
    LockComponents,
    /// Refinement: switch to manual editing
    ManualEditing,
}

/// Ceilings applied by the governor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationLimits {
    pub scaffold: u32,
    pub expansion: u32,
}

impl Default for RegenerationLimits {
    fn default() -> Self {
        Self {
            scaffold: SCAFFOLD_REGENERATION_LIMIT,
            expansion: EXPANSION_REGENERATION_LIMIT,
        }
    }
}

/// Usage of one budget after a recorded call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationUsage {
    pub used: u32,
    pub remaining: u32,
    pub limit: u32,
}

impl RegenerationUsage {
    fn new(used: u32, limit: u32) -> Self {
        Self {
            used,
            remaining: limit.saturating_sub(used),
            limit,
        }
    }
}

/// Both budgets for one adventure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdventureRegenerationUsage {
    pub scaffold: RegenerationUsage,
    pub expansion: RegenerationUsage,
}

#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    #[error("{message}")]
    LimitReached { limit: u32, message: String },

    #[error("Regeneration counter storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for GovernorError {
    fn from(err: sqlx::Error) -> Self {
        GovernorError::Storage(err.to_string())
    }
}

pub type GovernorResult<T> = Result<T, GovernorError>;

fn scaffold_limit_message(limit: u32) -> String {
    format!(
        "Scaffold regeneration limit reached ({limit}/{limit}). \
         Start a new adventure to explore a different direction."
    )
}

fn expansion_limit_message(limit: u32, guidance: ExpansionGuidance) -> String {
    match guidance {
        ExpansionGuidance::LockComponents => format!(
            "Expansion regeneration limit reached ({limit}/{limit}). \
             Lock the components you want to keep and edit the rest, or start a new adventure."
        ),
        ExpansionGuidance::ManualEditing => format!(
            "Refinement limit reached ({limit}/{limit}). \
             Use manual editing for further changes, or start a new adventure."
        ),
    }
}

/// Sole writer of regeneration counters.
#[derive(Clone)]
pub struct RegenerationGovernor {
    db: Database,
    limits: RegenerationLimits,
}

impl RegenerationGovernor {
    pub fn new(db: Database) -> Self {
        Self::with_limits(db, RegenerationLimits::default())
    }

    pub fn with_limits(db: Database, limits: RegenerationLimits) -> Self {
        Self { db, limits }
    }

    pub fn limits(&self) -> RegenerationLimits {
        self.limits
    }

    /// Create zeroed counters for a newly created adventure.
    pub async fn initialize(&self, adventure_id: &str) -> GovernorResult<()> {
        self.db.ensure_regeneration_counters(adventure_id).await?;
        debug!(adventure_id, "Regeneration counters initialized");
        Ok(())
    }

    /// Count one scaffold (or movement) regeneration.
    pub async fn record_scaffold_regeneration(&self, adventure_id: &str) -> GovernorResult<RegenerationUsage> {
        let limit = self.limits.scaffold;
        self.record(adventure_id, RegenerationCounter::Scaffold, limit, || scaffold_limit_message(limit))
            .await
    }

    /// Count one expansion or refinement against the shared expansion budget.
    pub async fn record_expansion_or_refinement(
        &self,
        adventure_id: &str,
        guidance: ExpansionGuidance,
    ) -> GovernorResult<RegenerationUsage> {
        let limit = self.limits.expansion;
        self.record(adventure_id, RegenerationCounter::Expansion, limit, || {
            expansion_limit_message(limit, guidance)
        })
        .await
    }

    /// Current usage for both budgets; unknown adventures report zero.
    pub async fn usage(&self, adventure_id: &str) -> GovernorResult<AdventureRegenerationUsage> {
        let (scaffold_used, expansion_used) = self
            .db
            .get_regeneration_counters(adventure_id)
            .await?
            .map(|r| (r.scaffold_used, r.expansion_used))
            .unwrap_or((0, 0));

        Ok(AdventureRegenerationUsage {
            scaffold: RegenerationUsage::new(scaffold_used.max(0) as u32, self.limits.scaffold),
            expansion: RegenerationUsage::new(expansion_used.max(0) as u32, self.limits.expansion),
        })
    }

    async fn record(
        &self,
        adventure_id: &str,
        counter: RegenerationCounter,
        limit: u32,
        message: impl FnOnce() -> String,
    ) -> GovernorResult<RegenerationUsage> {
        let incremented = match self
            .db
            .increment_regeneration_counter(adventure_id, counter, limit as i64)
            .await
        {
            Err(err) if is_write_conflict(&err) => {
                self.db
                    .increment_regeneration_counter(adventure_id, counter, limit as i64)
                    .await?
            }
            other => other?,
        };

        match incremented {
            Some(used) => {
                let usage = RegenerationUsage::new(used as u32, limit);
                debug!(adventure_id, ?counter, used = usage.used, remaining = usage.remaining, "Regeneration recorded");
                Ok(usage)
            }
            None => {
                info!(adventure_id, ?counter, limit, "Regeneration limit reached");
                Err(GovernorError::LimitReached {
                    limit,
                    message: message(),
                })
            }
        }
    }
}
