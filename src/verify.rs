//! Drift check between the remote listing and the fingerprint store.
//!
//! The orchestrator only ever looks at fingerprints, so objects deleted or
//! added remotely by hand go unnoticed by normal passes. `csync verify`
//! lists the remote and reports both directions of disagreement:
//!
//! - **untracked**: remote objects no fingerprint points at (orphans left
//!   by a crash between upload and commit, or manual uploads)
//! - **missing**: fingerprints whose remote object no longer exists; the
//!   content will not be re-uploaded until it changes or the fingerprint
//!   is removed

use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use corpus_sync_core::remote::RemoteStore;
use corpus_sync_core::store::FingerprintStore;

use crate::config::Config;
use crate::sqlite_store::SqliteFingerprintStore;
use crate::vector_store::VectorStoreRemote;

/// A fingerprint whose remote object was not listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRemote {
    pub id: String,
    pub remote_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub remote_objects: usize,
    pub fingerprints: usize,
    /// Remote ids no fingerprint refers to, sorted.
    pub untracked: Vec<String>,
    /// Sorted by content id.
    pub missing: Vec<MissingRemote>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.untracked.is_empty() && self.missing.is_empty()
    }
}

/// Compare the remote listing against the stored fingerprints.
pub async fn check_drift(
    remote: &dyn RemoteStore,
    fingerprints: &dyn FingerprintStore,
) -> Result<DriftReport> {
    let listed: HashSet<String> = remote.list().await?.into_iter().collect();
    let stored = fingerprints.get_all().await?;

    let tracked: HashSet<&str> = stored.values().map(|fp| fp.remote_id.as_str()).collect();

    let mut untracked: Vec<String> = listed
        .iter()
        .filter(|id| !tracked.contains(id.as_str()))
        .cloned()
        .collect();
    untracked.sort();

    let mut missing: Vec<MissingRemote> = stored
        .values()
        .filter(|fp| !listed.contains(&fp.remote_id))
        .map(|fp| MissingRemote {
            id: fp.id.clone(),
            remote_id: fp.remote_id.clone(),
        })
        .collect();
    missing.sort_by(|a, b| a.id.cmp(&b.id));

    let report = DriftReport {
        remote_objects: listed.len(),
        fingerprints: stored.len(),
        untracked,
        missing,
    };
    info!(
        remote = report.remote_objects,
        fingerprints = report.fingerprints,
        untracked = report.untracked.len(),
        missing = report.missing.len(),
        "drift check finished"
    );
    Ok(report)
}

/// Run `csync verify`. Returns whether the remote and store agree.
pub async fn run_verify(config: &Config, json: bool) -> Result<bool> {
    let store = SqliteFingerprintStore::open(config).await?;
    let remote = VectorStoreRemote::connect(config.remote()?).await?;
    let report = check_drift(&remote, &store).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.is_clean());
    }

    println!("verify {}", remote.vector_store_id());
    println!("  remote objects: {}", report.remote_objects);
    println!("  fingerprints: {}", report.fingerprints);
    for id in &report.untracked {
        println!("  untracked remote object: {}", id);
    }
    for m in &report.missing {
        println!("  missing remote object: {} (for {})", m.remote_id, m.id);
    }
    println!("{}", if report.is_clean() { "ok" } else { "drift detected" });
    Ok(report.is_clean())
}
