//! Response Cache
//!
//! Deduplicates identical generation requests. Request parameters are
//! serialized with object keys sorted at every depth and hashed with
//! SHA-256, so requests that differ only in field order share one entry.
//!
//! There is no lock between `lookup` and `store`: two concurrent identical
//! requests may both miss and both call the model. Both stores are accepted
//! because `store` is an upsert; the first body written stays, the second
//! only counts as an access. Duplicate upstream calls cost money, not
//! correctness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::database::{CacheEntryRecord, CacheOps, Database};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt cache entry {hash}: {reason}")]
    Corrupt { hash: String, reason: String },
}

pub type CacheResult<T> = Result<T, CacheError>;

// ============================================================================
// Canonicalization
// ============================================================================

/// Request parameters in canonical form together with their hash
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalParams {
    value: serde_json::Value,
    canonical: String,
    hash: String,
}

impl CanonicalParams {
    /// Canonicalize any serializable parameter set.
    pub fn from_serializable<T: Serialize + ?Sized>(params: &T) -> CacheResult<Self> {
        Ok(Self::from_value(serde_json::to_value(params)?))
    }

    pub fn from_value(value: serde_json::Value) -> Self {
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash = hex::encode(hasher.finalize());

        Self {
            value,
            canonical,
            hash,
        }
    }

    /// Hex-encoded SHA-256 of the canonical text
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Canonical JSON text (sorted keys, no whitespace)
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }
}

/// Write `value` as compact JSON with object keys in lexicographic order.
/// Does not rely on the map ordering `serde_json` was compiled with.
fn write_canonical(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

// ============================================================================
// Cache Entry
// ============================================================================

/// A cached completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub prompt_hash: String,
    pub canonical_params: serde_json::Value,
    pub response: serde_json::Value,
    pub model: String,
    pub temperature: f32,
    pub token_count: u32,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: u32,
}

impl TryFrom<CacheEntryRecord> for CacheEntry {
    type Error = CacheError;

    fn try_from(record: CacheEntryRecord) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| CacheError::Corrupt {
            hash: record.prompt_hash.clone(),
            reason,
        };
        let parse_time = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| corrupt(format!("bad timestamp {s}: {e}")))
        };

        Ok(Self {
            canonical_params: serde_json::from_str(&record.canonical_params)
                .map_err(|e| corrupt(format!("canonical_params: {e}")))?,
            response: serde_json::from_str(&record.response)
                .map_err(|e| corrupt(format!("response: {e}")))?,
            created_at: parse_time(&record.created_at)?,
            accessed_at: parse_time(&record.accessed_at)?,
            model: record.model.clone(),
            temperature: record.temperature as f32,
            token_count: record.token_count.max(0) as u32,
            access_count: record.access_count.max(0) as u32,
            prompt_hash: record.prompt_hash.clone(),
        })
    }
}

/// What `store` did with the offered response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// New entry written
    Inserted,
    /// Entry already present with the same body; counted as an access
    AlreadyCached,
    /// Entry already present with a different body; the offered body was dropped
    ConflictDiscarded,
}

/// Aggregate cache figures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: u64,
    pub total_accesses: u64,
    pub total_tokens: u64,
}

// ============================================================================
// Response Cache
// ============================================================================

/// Sole owner of cache entries.
#[derive(Clone)]
pub struct ResponseCache {
    db: Database,
}

impl ResponseCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Look up a response. A hit bumps `access_count` by one and sets
    /// `accessed_at` to now before the entry is returned.
    pub async fn lookup(&self, params: &CanonicalParams) -> CacheResult<Option<CacheEntry>> {
        let Some(record) = self.db.touch_cache_entry(params.hash()).await? else {
            debug!(prompt_hash = params.hash(), "Cache miss");
            return Ok(None);
        };

        let entry = CacheEntry::try_from(record)?;
        debug!(prompt_hash = params.hash(), access_count = entry.access_count, "Cache hit");
        Ok(Some(entry))
    }

    /// Store a response. An existing entry is never overwritten.
    pub async fn store(
        &self,
        params: &CanonicalParams,
        response: &serde_json::Value,
        token_count: u32,
        model: &str,
        temperature: f32,
    ) -> CacheResult<StoreOutcome> {
        let offered = serde_json::to_string(response)?;
        let record = CacheEntryRecord::new(
            params.hash().to_string(),
            params.canonical().to_string(),
            offered.clone(),
            model.to_string(),
            temperature as f64,
            token_count as i64,
        );

        let stored = self.db.upsert_cache_entry(&record).await?;

        // A conflicting upsert always bumps the count past 1.
        let outcome = if stored.access_count == 1 {
            StoreOutcome::Inserted
        } else if stored.response == offered {
            StoreOutcome::AlreadyCached
        } else {
            StoreOutcome::ConflictDiscarded
        };

        match outcome {
            StoreOutcome::ConflictDiscarded => warn!(
                prompt_hash = params.hash(),
                "Differing response offered for cached hash; keeping original"
            ),
            _ => debug!(prompt_hash = params.hash(), ?outcome, token_count, "Cache store"),
        }

        Ok(outcome)
    }

    pub async fn stats(&self) -> CacheResult<CacheStats> {
        let row = self.db.cache_stats().await?;
        Ok(CacheStats {
            entry_count: row.entry_count.max(0) as u64,
            total_accesses: row.total_accesses.max(0) as u64,
            total_tokens: row.total_tokens.max(0) as u64,
        })
    }
}
