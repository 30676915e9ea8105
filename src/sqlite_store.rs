//! SQLite-backed [`FingerprintStore`] implementation.
//!
//! Each `put` and `remove` is a single autocommitted statement, which gives
//! the per-key atomicity and durability the orchestrator's crash-recovery
//! contract relies on. No operation spans more than one row.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use corpus_sync_core::error::{StoreError, StoreResult};
use corpus_sync_core::models::{ContentFingerprint, NodeKind};
use corpus_sync_core::store::FingerprintStore;

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`FingerprintStore`] trait.
pub struct SqliteFingerprintStore {
    pool: SqlitePool,
}

impl SqliteFingerprintStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database, applying migrations first.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Open the database at `path` read-only, or `None` if it does not
    /// exist yet. Nothing is created and no migration runs.
    pub async fn open_existing(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let pool = db::connect_read_only(path).await?;
        Ok(Some(Self::new(pool)))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn row_to_fingerprint(row: &sqlx::sqlite::SqliteRow) -> StoreResult<ContentFingerprint> {
    let id: String = row.try_get("id").map_err(backend)?;
    let kind_label: String = row.try_get("kind").map_err(backend)?;
    let kind = NodeKind::parse(&kind_label).ok_or_else(|| StoreError::Corrupt {
        id: id.clone(),
        reason: format!("unknown kind '{}'", kind_label),
    })?;
    let ts: i64 = row.try_get("updated_at").map_err(backend)?;
    let updated_at = DateTime::<Utc>::from_timestamp(ts, 0).ok_or_else(|| StoreError::Corrupt {
        id: id.clone(),
        reason: format!("timestamp {} out of range", ts),
    })?;

    Ok(ContentFingerprint {
        content_hash: row.try_get("content_hash").map_err(backend)?,
        remote_id: row.try_get("remote_id").map_err(backend)?,
        parent_id: row.try_get("parent_id").map_err(backend)?,
        kind,
        updated_at,
        id,
    })
}

#[async_trait]
impl FingerprintStore for SqliteFingerprintStore {
    async fn get_all(&self) -> StoreResult<HashMap<String, ContentFingerprint>> {
        let rows = sqlx::query(
            "SELECT id, content_hash, remote_id, parent_id, kind, updated_at FROM fingerprints",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let fp = row_to_fingerprint(row)?;
            out.insert(fp.id.clone(), fp);
        }
        Ok(out)
    }

    async fn put(&self, fingerprint: &ContentFingerprint) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fingerprints (id, content_hash, remote_id, parent_id, kind, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content_hash = excluded.content_hash,
                remote_id = excluded.remote_id,
                parent_id = excluded.parent_id,
                kind = excluded.kind,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&fingerprint.id)
        .bind(&fingerprint.content_hash)
        .bind(&fingerprint.remote_id)
        .bind(&fingerprint.parent_id)
        .bind(fingerprint.kind.as_str())
        .bind(fingerprint.updated_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM fingerprints WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
