//! Database Migrations
//!
//! Handles schema creation and versioned migrations.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{info, warn};

/// Current database schema version
const SCHEMA_VERSION: i32 = 3;

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version = get_current_version(pool).await?;

    info!(current_version, target_version = SCHEMA_VERSION, "Checking database migrations");

    if current_version < SCHEMA_VERSION {
        info!("Running database migrations from v{} to v{}", current_version, SCHEMA_VERSION);

        for version in (current_version + 1)..=SCHEMA_VERSION {
            run_migration(pool, version).await?;
        }

        info!("Database migrations completed successfully");
    }

    Ok(())
}

/// Get the current schema version
async fn get_current_version(pool: &SqlitePool) -> Result<i32, sqlx::Error> {
    let result = sqlx::query("SELECT MAX(version) as version FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(result
        .and_then(|row| row.try_get::<i32, _>("version").ok())
        .unwrap_or(0))
}

/// Run a specific migration version.
///
/// Each migration is a list of statements rather than one `;`-separated
/// script because trigger bodies contain semicolons of their own.
async fn run_migration(pool: &SqlitePool, version: i32) -> Result<(), sqlx::Error> {
    let (name, statements): (&str, &[&str]) = match version {
        1 => ("credit_ledger", MIGRATION_V1),
        2 => ("llm_cache", MIGRATION_V2),
        3 => ("regeneration_counters", MIGRATION_V3),
        _ => {
            warn!("Unknown migration version: {}", version);
            return Ok(());
        }
    };

    info!("Applying migration v{}: {}", version, name);

    let mut tx = pool.begin().await?;

    for statement in statements {
        sqlx::query(statement.trim()).execute(&mut *tx).await?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(version)
        .bind(name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

/// Migration v1: credit balances and the append-only transaction ledger
const MIGRATION_V1: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS credit_balances (
        user_id TEXT PRIMARY KEY,
        credits INTEGER NOT NULL DEFAULT 0 CHECK (credits >= 0),
        total_purchased INTEGER NOT NULL DEFAULT 0 CHECK (total_purchased >= 0),
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS credit_transactions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        kind TEXT NOT NULL CHECK (kind IN ('consumption', 'purchase', 'refund')),
        credit_type TEXT NOT NULL,
        amount INTEGER NOT NULL,
        balance_after INTEGER NOT NULL CHECK (balance_after >= 0),
        metadata TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_credit_transactions_user ON credit_transactions(user_id, created_at DESC)",
    r#"
    CREATE TRIGGER IF NOT EXISTS credit_transactions_no_update
    BEFORE UPDATE ON credit_transactions
    BEGIN
        SELECT RAISE(ABORT, 'credit_transactions is append-only');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS credit_transactions_no_delete
    BEFORE DELETE ON credit_transactions
    BEGIN
        SELECT RAISE(ABORT, 'credit_transactions is append-only');
    END
    "#,
];

/// Migration v2: response cache keyed by canonical prompt hash
const MIGRATION_V2: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS llm_cache (
        prompt_hash TEXT PRIMARY KEY,
        canonical_params TEXT NOT NULL,
        response TEXT NOT NULL,
        model TEXT NOT NULL,
        temperature REAL NOT NULL,
        token_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        accessed_at TEXT NOT NULL,
        access_count INTEGER NOT NULL DEFAULT 1 CHECK (access_count >= 1)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_llm_cache_accessed ON llm_cache(accessed_at)",
];

/// Migration v3: per-adventure regeneration counters
const MIGRATION_V3: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS regeneration_counters (
        adventure_id TEXT PRIMARY KEY,
        scaffold_used INTEGER NOT NULL DEFAULT 0 CHECK (scaffold_used >= 0),
        expansion_used INTEGER NOT NULL DEFAULT 0 CHECK (expansion_used >= 0),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];
