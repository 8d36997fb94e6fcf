//! Response Cache Records

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Cached completion keyed by canonical prompt hash
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CacheEntryRecord {
    pub prompt_hash: String,
    pub canonical_params: String, // JSON
    pub response: String,         // JSON
    pub model: String,
    pub temperature: f64,
    pub token_count: i64,
    pub created_at: String,
    pub accessed_at: String,
    pub access_count: i64,
}

impl CacheEntryRecord {
    pub fn new(
        prompt_hash: String,
        canonical_params: String,
        response: String,
        model: String,
        temperature: f64,
        token_count: i64,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            prompt_hash,
            canonical_params,
            response,
            model,
            temperature,
            token_count,
            created_at: now.clone(),
            accessed_at: now,
            access_count: 1,
        }
    }
}
