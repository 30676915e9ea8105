//! Schema migrations for the fingerprint database.
//!
//! Every statement is `IF NOT EXISTS`, so running `csync init` (or any
//! command that opens the store) repeatedly is safe.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the fingerprint schema on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per content id that is currently live remotely
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fingerprints (
            id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            remote_id TEXT NOT NULL,
            parent_id TEXT,
            kind TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fingerprints_remote ON fingerprints(remote_id)")
        .execute(pool)
        .await?;

    Ok(())
}
