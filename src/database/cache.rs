//! Response cache database operations
//!
//! Entries are never rewritten: a conflicting insert only records an access.

use super::models::CacheEntryRecord;
use super::{now_rfc3339, Database};
use sqlx::Row;

/// Aggregate figures over the cache table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatsRow {
    pub entry_count: i64,
    pub total_accesses: i64,
    pub total_tokens: i64,
}

/// Extension trait for response cache database operations
pub trait CacheOps {
    /// Record a hit on `prompt_hash` and return the updated entry.
    fn touch_cache_entry(&self, prompt_hash: &str) -> impl std::future::Future<Output = Result<Option<CacheEntryRecord>, sqlx::Error>> + Send;

    /// Read an entry without recording an access.
    fn get_cache_entry(&self, prompt_hash: &str) -> impl std::future::Future<Output = Result<Option<CacheEntryRecord>, sqlx::Error>> + Send;

    /// Insert `entry`, or record an access on the existing row with the same
    /// hash. Returns the row as stored; its `response` is the original body.
    fn upsert_cache_entry(&self, entry: &CacheEntryRecord) -> impl std::future::Future<Output = Result<CacheEntryRecord, sqlx::Error>> + Send;

    fn cache_stats(&self) -> impl std::future::Future<Output = Result<CacheStatsRow, sqlx::Error>> + Send;
}

impl CacheOps for Database {
    async fn touch_cache_entry(&self, prompt_hash: &str) -> Result<Option<CacheEntryRecord>, sqlx::Error> {
        sqlx::query_as::<_, CacheEntryRecord>(
            r#"
            UPDATE llm_cache
            SET access_count = access_count + 1, accessed_at = ?
            WHERE prompt_hash = ?
            RETURNING *
            "#
        )
        .bind(now_rfc3339())
        .bind(prompt_hash)
        .fetch_optional(self.pool())
        .await
    }

    async fn get_cache_entry(&self, prompt_hash: &str) -> Result<Option<CacheEntryRecord>, sqlx::Error> {
        sqlx::query_as::<_, CacheEntryRecord>(
            "SELECT * FROM llm_cache WHERE prompt_hash = ?"
        )
        .bind(prompt_hash)
        .fetch_optional(self.pool())
        .await
    }

    async fn upsert_cache_entry(&self, entry: &CacheEntryRecord) -> Result<CacheEntryRecord, sqlx::Error> {
        sqlx::query_as::<_, CacheEntryRecord>(
            r#"
            INSERT INTO llm_cache
            (prompt_hash, canonical_params, response, model, temperature, token_count,
             created_at, accessed_at, access_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(prompt_hash) DO UPDATE SET
                access_count = access_count + 1,
                accessed_at = excluded.accessed_at
            RETURNING *
            "#
        )
        .bind(&entry.prompt_hash)
        .bind(&entry.canonical_params)
        .bind(&entry.response)
        .bind(&entry.model)
        .bind(entry.temperature)
        .bind(entry.token_count)
        .bind(&entry.created_at)
        .bind(&entry.accessed_at)
        .bind(entry.access_count)
        .fetch_one(self.pool())
        .await
    }

    async fn cache_stats(&self) -> Result<CacheStatsRow, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as entry_count,
                COALESCE(SUM(access_count), 0) as total_accesses,
                COALESCE(SUM(token_count), 0) as total_tokens
            FROM llm_cache
            "#
        )
        .fetch_one(self.pool())
        .await?;

        Ok(CacheStatsRow {
            entry_count: row.get("entry_count"),
            total_accesses: row.get("total_accesses"),
            total_tokens: row.get("total_tokens"),
        })
    }
}
