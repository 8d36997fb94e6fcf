//! Regeneration counter database operations

use super::models::{RegenerationCounter, RegenerationCountersRecord};
use super::{now_rfc3339, Database};

/// Extension trait for regeneration counter database operations
pub trait RegenerationOps {
    /// Create the zero row for an adventure. Existing rows are left untouched.
    fn ensure_regeneration_counters(&self, adventure_id: &str) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_regeneration_counters(&self, adventure_id: &str) -> impl std::future::Future<Output = Result<Option<RegenerationCountersRecord>, sqlx::Error>> + Send;

    /// Increment `counter` if it is below `limit`. Returns the new count, or
    /// `None` when the limit has already been reached.
    fn increment_regeneration_counter(
        &self,
        adventure_id: &str,
        counter: RegenerationCounter,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Option<i64>, sqlx::Error>> + Send;
}

impl RegenerationOps for Database {
    async fn ensure_regeneration_counters(&self, adventure_id: &str) -> Result<(), sqlx::Error> {
        let record = RegenerationCountersRecord::new(adventure_id);
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO regeneration_counters
            (adventure_id, scaffold_used, expansion_used, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#
        )
        .bind(&record.adventure_id)
        .bind(record.scaffold_used)
        .bind(record.expansion_used)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_regeneration_counters(&self, adventure_id: &str) -> Result<Option<RegenerationCountersRecord>, sqlx::Error> {
        sqlx::query_as::<_, RegenerationCountersRecord>(
            "SELECT * FROM regeneration_counters WHERE adventure_id = ?"
        )
        .bind(adventure_id)
        .fetch_optional(self.pool())
        .await
    }

    async fn increment_regeneration_counter(
        &self,
        adventure_id: &str,
        counter: RegenerationCounter,
        limit: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        self.ensure_regeneration_counters(adventure_id).await?;

        let column = counter.column();
        let sql = format!(
            "UPDATE regeneration_counters SET {column} = {column} + 1, updated_at = ? \
             WHERE adventure_id = ? AND {column} < ? RETURNING {column}"
        );

        sqlx::query_scalar::<_, i64>(&sql)
            .bind(now_rfc3339())
            .bind(adventure_id)
            .bind(limit)
            .fetch_optional(self.pool())
            .await
    }
}
