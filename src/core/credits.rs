//! Credit Ledger
//!
//! Per-user integer credit balances with atomic consume, refund and add.
//! Every mutation appends an immutable `CreditTransactionRecord`; the
//! balance can never go negative because debits are conditional updates.
//!
//! Operation costs live in one table ([`OperationKind::cost`]) so adding a
//! paid operation is a single match arm.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::database::{CreditBalanceRecord, CreditOps, CreditTransactionRecord, Database, TransactionKind};

// ============================================================================
// Operation Kinds and Costs
// ============================================================================

/// Paid generation operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Scaffold,
    SceneExpansion,
    Refinement,
    MovementRegeneration,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Scaffold,
        OperationKind::SceneExpansion,
        OperationKind::Refinement,
        OperationKind::MovementRegeneration,
    ];

    /// Credit type recorded on ledger transactions.
    pub fn credit_type(&self) -> &'static str {
        match self {
            OperationKind::Scaffold => "scaffold_generation",
            OperationKind::SceneExpansion => "scene_expansion",
            OperationKind::Refinement => "content_refinement",
            OperationKind::MovementRegeneration => "movement_regeneration",
        }
    }

    /// List price in credits, possibly fractional.
    fn base_cost(&self) -> f64 {
        match self {
            OperationKind::Scaffold => 1.0,
            OperationKind::SceneExpansion => 1.0,
            OperationKind::Refinement => 1.0,
            OperationKind::MovementRegeneration => 1.0,
        }
    }

    /// Whole credits charged for one call.
    pub fn cost(&self) -> i64 {
        whole_credits(self.base_cost())
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.credit_type())
    }
}

/// Fractional prices round up; nothing is ever free by truncation.
fn whole_credits(raw: f64) -> i64 {
    raw.ceil().max(0.0) as i64
}

// ============================================================================
// Purchase Sources
// ============================================================================

/// Origin of credits added with [`CreditLedger::add_credits`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CreditSource {
    /// Paid checkout; counts toward `total_purchased`
    Purchase { reference: String },
    /// Operator grant
    Grant { reason: String },
    /// Promotional or sign-up bonus
    Promotion { code: String },
}

impl CreditSource {
    pub fn is_purchase(&self) -> bool {
        matches!(self, CreditSource::Purchase { .. })
    }

    fn credit_type(&self) -> &'static str {
        match self {
            CreditSource::Purchase { .. } => "purchase",
            CreditSource::Grant { .. } => "grant",
            CreditSource::Promotion { .. } => "promotion",
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the credit ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("Credit amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("Concurrent ledger update detected: {0}")]
    WriteConflict(String),

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if is_write_conflict(&err) {
            LedgerError::WriteConflict(err.to_string())
        } else {
            LedgerError::Storage(err.to_string())
        }
    }
}

/// SQLite reports lock contention as BUSY (5) or LOCKED (6), including
/// extended codes such as BUSY_SNAPSHOT (517).
pub(crate) fn is_write_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xFF, 5 | 6))
            .unwrap_or(false),
        _ => false,
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ============================================================================
// Credit Ledger
// ============================================================================

/// Sole writer of credit balances and ledger records.
#[derive(Clone)]
pub struct CreditLedger {
    db: Database,
}

impl CreditLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Current credits. Users without a balance row have 0.
    pub async fn get_balance(&self, user_id: &str) -> LedgerResult<i64> {
        Ok(self.balance(user_id).await?.credits)
    }

    /// Full balance record, synthesized as empty for unknown users.
    pub async fn balance(&self, user_id: &str) -> LedgerResult<CreditBalanceRecord> {
        Ok(self
            .db
            .get_credit_balance(user_id)
            .await?
            .unwrap_or_else(|| CreditBalanceRecord::empty(user_id)))
    }

    /// Whether the user can currently afford one `operation`.
    pub async fn check_sufficiency(&self, user_id: &str, operation: OperationKind) -> LedgerResult<bool> {
        Ok(self.get_balance(user_id).await? >= operation.cost())
    }

    /// Atomically charge one `operation`. Returns the remaining credits.
    pub async fn consume(
        &self,
        user_id: &str,
        operation: OperationKind,
        metadata: serde_json::Value,
    ) -> LedgerResult<i64> {
        let cost = operation.cost();

        let debited = retry_once_on_conflict("consume", || {
            self.db.debit_credits(user_id, cost, operation.credit_type(), Some(&metadata))
        })
        .await?;

        match debited {
            Some(remaining) => {
                debug!(user_id, %operation, cost, remaining, "Credits consumed");
                Ok(remaining)
            }
            None => {
                let available = self.get_balance(user_id).await?;
                info!(user_id, %operation, cost, available, "Insufficient credits");
                Err(LedgerError::InsufficientCredits {
                    required: cost,
                    available,
                })
            }
        }
    }

    /// Reverse a prior successful [`consume`](Self::consume) whose downstream
    /// work failed. Returns the new balance.
    pub async fn refund(
        &self,
        user_id: &str,
        operation: OperationKind,
        metadata: serde_json::Value,
    ) -> LedgerResult<i64> {
        let amount = operation.cost();

        let balance = retry_once_on_conflict("refund", || {
            self.db.credit_credits(
                user_id,
                amount,
                TransactionKind::Refund,
                operation.credit_type(),
                false,
                Some(&metadata),
            )
        })
        .await?;

        info!(user_id, %operation, amount, balance, "Credits refunded");
        Ok(balance)
    }

    /// Add credits from `source`. Returns the new balance.
    pub async fn add_credits(&self, user_id: &str, amount: i64, source: CreditSource) -> LedgerResult<i64> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let metadata = serde_json::to_value(&source).unwrap_or(serde_json::Value::Null);
        let purchased = source.is_purchase();

        let balance = retry_once_on_conflict("add_credits", || {
            self.db.credit_credits(
                user_id,
                amount,
                TransactionKind::Purchase,
                source.credit_type(),
                purchased,
                Some(&metadata),
            )
        })
        .await?;

        info!(user_id, amount, balance, source = source.credit_type(), "Credits added");
        Ok(balance)
    }

    /// Newest-first ledger history for a user.
    pub async fn transactions(&self, user_id: &str, limit: i64) -> LedgerResult<Vec<CreditTransactionRecord>> {
        Ok(self.db.list_credit_transactions(user_id, limit).await?)
    }
}

/// Run a ledger write, retrying exactly once if SQLite reports contention.
async fn retry_once_on_conflict<T, F, Fut>(operation: &str, mut attempt: F) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match attempt().await {
        Ok(value) => Ok(value),
        Err(err) if is_write_conflict(&err) => {
            warn!(operation, error = %err, "Ledger write conflict, retrying once");
            Ok(attempt().await?)
        }
        Err(err) => Err(err.into()),
    }
}
