//! Credit ledger database operations
//!
//! Every balance mutation and its ledger record are written in one
//! transaction. Debits are conditional updates, never read-then-write.

use super::models::{CreditBalanceRecord, CreditTransactionRecord, TransactionKind};
use super::{now_rfc3339, Database};

/// Extension trait for credit ledger database operations
pub trait CreditOps {
    fn get_credit_balance(&self, user_id: &str) -> impl std::future::Future<Output = Result<Option<CreditBalanceRecord>, sqlx::Error>> + Send;

    /// Debit `amount` if the balance covers it. Returns the new balance, or
    /// `None` when the balance is insufficient (nothing is written).
    fn debit_credits(
        &self,
        user_id: &str,
        amount: i64,
        credit_type: &str,
        metadata: Option<&serde_json::Value>,
    ) -> impl std::future::Future<Output = Result<Option<i64>, sqlx::Error>> + Send;

    /// Credit `amount`, creating the balance row if needed. `purchased` also
    /// raises `total_purchased`. Returns the new balance.
    fn credit_credits(
        &self,
        user_id: &str,
        amount: i64,
        kind: TransactionKind,
        credit_type: &str,
        purchased: bool,
        metadata: Option<&serde_json::Value>,
    ) -> impl std::future::Future<Output = Result<i64, sqlx::Error>> + Send;

    fn list_credit_transactions(&self, user_id: &str, limit: i64) -> impl std::future::Future<Output = Result<Vec<CreditTransactionRecord>, sqlx::Error>> + Send;
}

impl CreditOps for Database {
    async fn get_credit_balance(&self, user_id: &str) -> Result<Option<CreditBalanceRecord>, sqlx::Error> {
        sqlx::query_as::<_, CreditBalanceRecord>(
            "SELECT * FROM credit_balances WHERE user_id = ?"
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
    }

    async fn debit_credits(
        &self,
        user_id: &str,
        amount: i64,
        credit_type: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        // The write is the first statement so the transaction takes the write
        // lock up front instead of upgrading from a stale read snapshot.
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE credit_balances
            SET credits = credits - ?, updated_at = ?
            WHERE user_id = ? AND credits >= ?
            RETURNING credits
            "#
        )
        .bind(amount)
        .bind(now_rfc3339())
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = balance else {
            tx.rollback().await?;
            return Ok(None);
        };

        let record = CreditTransactionRecord::new(
            user_id,
            TransactionKind::Consumption,
            credit_type,
            -amount,
            balance,
            metadata,
        );
        insert_transaction(&mut tx, &record).await?;

        tx.commit().await?;
        Ok(Some(balance))
    }

    async fn credit_credits(
        &self,
        user_id: &str,
        amount: i64,
        kind: TransactionKind,
        credit_type: &str,
        purchased: bool,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        let purchased_delta = if purchased { amount } else { 0 };
        let balance: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO credit_balances (user_id, credits, total_purchased, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                credits = credits + excluded.credits,
                total_purchased = total_purchased + excluded.total_purchased,
                updated_at = excluded.updated_at
            RETURNING credits
            "#
        )
        .bind(user_id)
        .bind(amount)
        .bind(purchased_delta)
        .bind(now_rfc3339())
        .fetch_one(&mut *tx)
        .await?;

        let record = CreditTransactionRecord::new(user_id, kind, credit_type, amount, balance, metadata);
        insert_transaction(&mut tx, &record).await?;

        tx.commit().await?;
        Ok(balance)
    }

    async fn list_credit_transactions(&self, user_id: &str, limit: i64) -> Result<Vec<CreditTransactionRecord>, sqlx::Error> {
        sqlx::query_as::<_, CreditTransactionRecord>(
            "SELECT * FROM credit_transactions WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?"
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await
    }
}

async fn insert_transaction(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    record: &CreditTransactionRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO credit_transactions
        (id, user_id, kind, credit_type, amount, balance_after, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#
    )
    .bind(&record.id)
    .bind(&record.user_id)
    .bind(&record.kind)
    .bind(&record.credit_type)
    .bind(record.amount)
    .bind(record.balance_after)
    .bind(&record.metadata)
    .bind(&record.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
