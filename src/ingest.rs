//! Synchronization pass orchestration.
//!
//! Coordinates one pass: source → fingerprint snapshot → diff → staged
//! execution → per-item fingerprint commit.
//!
//! # Crash recovery
//!
//! Every confirmed remote mutation is committed to the fingerprint store
//! before the next result is looked at. Nothing "pending" is ever
//! persisted, so a crash at any point leaves each id either in its previous
//! committed state or in its new one, and the next pass recomputes exactly
//! the operations that are still outstanding.
//!
//! | Remote outcome | Fingerprint store |
//! |----------------|-------------------|
//! | unchanged, parent moved | `put` refreshed parent link before any stage |
//! | create/update confirmed | `put` new hash and remote id |
//! | delete confirmed | `remove`, unless the id was re-uploaded this pass |
//! | any failure | untouched; retried naturally next pass |

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use corpus_sync_core::diff::{diff, DiffPlan, KindChangePolicy};
use corpus_sync_core::error::{StoreResult, SyncError};
use corpus_sync_core::hash::content_hash;
use corpus_sync_core::models::{
    ContentFingerprint, ContentNode, OperationResult, Outcome, PassSummary, SyncOperation,
};
use corpus_sync_core::remote::RemoteStore;
use corpus_sync_core::source::ContentSource;
use corpus_sync_core::stage::plan_stages;
use corpus_sync_core::store::memory::InMemoryFingerprintStore;
use corpus_sync_core::store::FingerprintStore;

use crate::config::{Config, SourceConfig};
use crate::connector_help_center::HelpCenterSource;
use crate::connector_snapshot::SnapshotSource;
use crate::executor::{BatchExecutor, RetryPolicy};
use crate::sqlite_store::SqliteFingerprintStore;
use crate::vector_store::VectorStoreRemote;

/// Tunables for one pass.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    pub retry: RetryPolicy,
    pub concurrency: usize,
    pub kind_change: KindChangePolicy,
}

impl PassOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.executor.retry_policy(),
            concurrency: config.executor.concurrency,
            kind_change: config.sync.kind_change,
        }
    }
}

/// The operations a pass would run, without running them.
#[derive(Debug, Clone)]
pub struct PassPlan {
    /// Nodes returned by the source.
    pub fetched: usize,
    pub diff: DiffPlan,
}

/// Fetch the tree, load fingerprints and diff them.
///
/// Performs no remote or fingerprint mutation.
pub async fn plan_pass(
    source: &dyn ContentSource,
    fingerprints: &dyn FingerprintStore,
    kind_change: KindChangePolicy,
) -> Result<(PassPlan, HashMap<String, ContentFingerprint>), SyncError> {
    let tree = match source.fetch_tree().await {
        Ok(tree) => tree,
        Err(err) => {
            error!(source = source.name(), error = %err, "fetch failed; aborting pass");
            return Err(err.into());
        }
    };
    let prior = fingerprints.get_all().await?;
    let plan = diff(&tree, &prior, kind_change);

    let s = &plan.stats;
    info!(
        fetched = tree.len(),
        new = s.new,
        changed = s.changed,
        unchanged = s.unchanged,
        removed = s.removed,
        moved = plan.refreshes.len(),
        "diff computed"
    );
    if s.unparented > 0 {
        debug!(count = s.unparented, "nodes with a parent outside the fetched tree");
    }

    Ok((
        PassPlan {
            fetched: tree.len(),
            diff: plan,
        },
        prior,
    ))
}

/// Drives synchronization passes.
pub struct Orchestrator {
    source: Arc<dyn ContentSource>,
    fingerprints: Arc<dyn FingerprintStore>,
    executor: BatchExecutor,
    kind_change: KindChangePolicy,
    cancel: Option<watch::Receiver<bool>>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn ContentSource>,
        fingerprints: Arc<dyn FingerprintStore>,
        remote: Arc<dyn RemoteStore>,
        options: PassOptions,
    ) -> Self {
        Self {
            source,
            fingerprints,
            executor: BatchExecutor::new(remote, options.retry, options.concurrency),
            kind_change: options.kind_change,
            cancel: None,
        }
    }

    /// Stop at the next stage boundary once `true` is sent on the channel.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Compute the operations the next pass would run.
    pub async fn plan(&self) -> Result<PassPlan, SyncError> {
        let (plan, _) = plan_pass(
            self.source.as_ref(),
            self.fingerprints.as_ref(),
            self.kind_change,
        )
        .await?;
        Ok(plan)
    }

    /// Run one full fetch → diff → execute → commit pass.
    ///
    /// Per-operation failures are counted in the summary and never abort
    /// the pass. Source failures abort before any mutation; fingerprint
    /// store failures abort immediately.
    pub async fn run_pass(&self) -> Result<PassSummary, SyncError> {
        info!(source = self.source.name(), "starting pass");
        let (plan, prior) = plan_pass(
            self.source.as_ref(),
            self.fingerprints.as_ref(),
            self.kind_change,
        )
        .await?;

        // Remote id each content id is currently recorded under.
        let mut live: HashMap<String, String> = prior
            .into_iter()
            .map(|(id, fp)| (id, fp.remote_id))
            .collect();

        let mut summary = PassSummary {
            unchanged: plan.diff.stats.unchanged as u64,
            ..PassSummary::default()
        };

        // Delete depths come from stored parent links; record moves first.
        for fingerprint in &plan.diff.refreshes {
            if let Err(err) = self.fingerprints.put(fingerprint).await {
                error!(id = %fingerprint.id, error = %err, "parent link refresh failed");
                return Err(SyncError::FingerprintStore(err));
            }
            debug!(
                id = %fingerprint.id,
                parent = ?fingerprint.parent_id,
                "parent link refreshed"
            );
        }

        let stages = plan_stages(plan.diff.operations);
        let total = stages.len();
        for (i, stage) in stages.into_iter().enumerate() {
            if self.is_cancelled() {
                warn!(remaining_stages = total - i, "pass cancelled at stage boundary");
                summary.cancelled = true;
                break;
            }

            info!(
                stage = %stage.label(),
                operations = stage.len(),
                "running stage {}/{}",
                i + 1,
                total
            );
            let mut results = self.executor.run_stage(stage);
            while let Some(result) = results.next().await {
                self.commit(&result, &mut live).await?;
                summary.record(&result);
            }
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "pass finished"
        );
        Ok(summary)
    }

    /// Record one confirmed remote mutation.
    async fn commit(
        &self,
        result: &OperationResult,
        live: &mut HashMap<String, String>,
    ) -> Result<(), SyncError> {
        let Outcome::Success { remote_id: returned } = &result.outcome else {
            return Ok(());
        };

        let written = match &result.operation {
            SyncOperation::Create { node, .. } => {
                let Some(remote_id) = returned.clone() else {
                    warn!(id = %node.id, "create confirmed without a remote id; not recorded");
                    return Ok(());
                };
                self.put(node, remote_id, live).await
            }
            SyncOperation::Update {
                node, remote_id, ..
            } => {
                let remote_id = returned.clone().unwrap_or_else(|| remote_id.clone());
                self.put(node, remote_id, live).await
            }
            SyncOperation::Delete { id, remote_id, .. } => {
                if live.get(id) != Some(remote_id) {
                    debug!(%id, "fingerprint already points at a newer upload; keeping it");
                    return Ok(());
                }
                let removed = self.fingerprints.remove(id).await;
                if removed.is_ok() {
                    live.remove(id);
                }
                removed
            }
        };

        written.map_err(|err| {
            error!(
                op = %result.operation,
                error = %err,
                "remote mutation confirmed but fingerprint commit failed"
            );
            SyncError::FingerprintStore(err)
        })
    }

    async fn put(
        &self,
        node: &ContentNode,
        remote_id: String,
        live: &mut HashMap<String, String>,
    ) -> StoreResult<()> {
        let fingerprint = ContentFingerprint {
            id: node.id.clone(),
            content_hash: content_hash(node),
            remote_id,
            parent_id: node.parent_id.clone(),
            kind: node.kind,
            updated_at: Utc::now(),
        };
        self.fingerprints.put(&fingerprint).await?;
        live.insert(fingerprint.id, fingerprint.remote_id);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// CLI entry point
// ═══════════════════════════════════════════════════════════════════════

/// How a `csync sync` run ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Every operation succeeded (or nothing changed).
    Clean,
    /// At least one operation failed; the rest were applied.
    Failed,
    /// The pass stopped before any or all operations ran.
    Aborted,
    /// Cancelled at a stage boundary.
    Cancelled,
}

impl SyncStatus {
    pub fn from_summary(summary: &PassSummary) -> Self {
        if summary.cancelled {
            SyncStatus::Cancelled
        } else if summary.failed > 0 {
            SyncStatus::Failed
        } else {
            SyncStatus::Clean
        }
    }

    pub fn code(self) -> u8 {
        match self {
            SyncStatus::Clean => 0,
            SyncStatus::Failed => 1,
            SyncStatus::Aborted => 2,
            SyncStatus::Cancelled => 130,
        }
    }
}

/// Build the configured content source.
pub fn build_source(config: &Config) -> Result<Arc<dyn ContentSource>> {
    let source: Arc<dyn ContentSource> = match &config.source {
        SourceConfig::HelpCenter(hc) => Arc::new(HelpCenterSource::new(
            hc.clone(),
            config.executor.retry_policy(),
        )?),
        SourceConfig::Snapshot(snap) => Arc::new(SnapshotSource::new(&snap.path)),
    };
    Ok(source)
}

/// Run `csync sync`.
///
/// With `dry_run` the planned operations are printed and nothing is
/// mutated: the database is opened read-only, or not at all if it does not
/// exist yet, and no remote credentials are needed. Otherwise one full pass
/// runs and its summary is printed. Source and fingerprint store failures
/// are returned as errors.
pub async fn run_sync(
    config: &Config,
    dry_run: bool,
    json: bool,
    cancel: watch::Receiver<bool>,
) -> Result<SyncStatus> {
    let source = build_source(config)?;

    if dry_run {
        let store: Arc<dyn FingerprintStore> =
            match SqliteFingerprintStore::open_existing(&config.db.path).await? {
                Some(store) => Arc::new(store),
                None => {
                    info!(path = %config.db.path.display(), "no fingerprint database yet");
                    Arc::new(InMemoryFingerprintStore::new())
                }
            };
        let (plan, _) = plan_pass(source.as_ref(), store.as_ref(), config.sync.kind_change).await?;
        print_plan(&plan, json)?;
        return Ok(SyncStatus::Clean);
    }

    let store = Arc::new(SqliteFingerprintStore::open(config).await?);
    let remote = Arc::new(VectorStoreRemote::connect(config.remote()?).await?);
    let orchestrator = Orchestrator::new(source, store, remote, PassOptions::from_config(config))
        .with_cancellation(cancel);

    let summary = orchestrator.run_pass().await?;
    print_summary(&summary, json)?;
    Ok(SyncStatus::from_summary(&summary))
}

fn print_plan(plan: &PassPlan, json: bool) -> Result<()> {
    let s = &plan.diff.stats;
    if json {
        let operations: Vec<serde_json::Value> = plan
            .diff
            .operations
            .iter()
            .map(|op| {
                serde_json::json!({
                    "op": op.verb(),
                    "id": op.id(),
                    "depth": op.depth(),
                })
            })
            .collect();
        let out = serde_json::json!({
            "dry_run": true,
            "fetched": plan.fetched,
            "new": s.new,
            "changed": s.changed,
            "unchanged": s.unchanged,
            "removed": s.removed,
            "moved": plan.diff.refreshes.len(),
            "operations": operations,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("sync (dry-run)");
    println!("  fetched: {}", plan.fetched);
    println!(
        "  new: {}  changed: {}  unchanged: {}  removed: {}",
        s.new, s.changed, s.unchanged, s.removed
    );
    for op in &plan.diff.operations {
        println!("  {} {} (depth {})", op.verb(), op.id(), op.depth());
    }
    for fp in &plan.diff.refreshes {
        println!("  move {} -> {}", fp.id, fp.parent_id.as_deref().unwrap_or("(root)"));
    }
    Ok(())
}

fn print_summary(summary: &PassSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("sync");
    println!("  created: {}", summary.created);
    println!("  updated: {}", summary.updated);
    println!("  deleted: {}", summary.deleted);
    println!("  unchanged: {}", summary.unchanged);
    println!("  failed: {}", summary.failed);
    if summary.cancelled {
        println!("cancelled");
    } else if summary.failed > 0 {
        println!("completed with failures");
    } else {
        println!("ok");
    }
    Ok(())
}
