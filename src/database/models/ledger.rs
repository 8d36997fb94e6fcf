//! Credit Ledger Records
//!
//! Balance rows and the append-only transaction log.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Transaction Kind Enum
// ============================================================================

/// Kind of ledger mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Consumption,
    Purchase,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Consumption => "consumption",
            TransactionKind::Purchase => "purchase",
            TransactionKind::Refund => "refund",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "consumption" => Ok(TransactionKind::Consumption),
            "purchase" => Ok(TransactionKind::Purchase),
            "refund" => Ok(TransactionKind::Refund),
            _ => Err(format!("Unknown transaction kind: {}", s)),
        }
    }
}

// ============================================================================
// Credit Balance Record
// ============================================================================

/// Per-user credit balance
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditBalanceRecord {
    pub user_id: String,
    pub credits: i64,
    pub total_purchased: i64,
    pub updated_at: String,
}

impl CreditBalanceRecord {
    /// Balance reported for users that have never held credits.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            credits: 0,
            total_purchased: 0,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ============================================================================
// Credit Transaction Record
// ============================================================================

/// Immutable ledger entry written alongside every balance mutation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditTransactionRecord {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub credit_type: String,
    /// Signed delta applied to the balance
    pub amount: i64,
    pub balance_after: i64,
    pub metadata: Option<String>, // JSON
    pub created_at: String,
}

impl CreditTransactionRecord {
    pub fn new(
        user_id: &str,
        kind: TransactionKind,
        credit_type: &str,
        amount: i64,
        balance_after: i64,
        metadata: Option<&serde_json::Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: kind.as_str().to_string(),
            credit_type: credit_type.to_string(),
            amount,
            balance_after,
            metadata: metadata.map(|m| m.to_string()),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn transaction_kind(&self) -> Option<TransactionKind> {
        TransactionKind::try_from(self.kind.as_str()).ok()
    }

    pub fn metadata_value(&self) -> Option<serde_json::Value> {
        self.metadata.as_deref().and_then(|m| serde_json::from_str(m).ok())
    }
}
