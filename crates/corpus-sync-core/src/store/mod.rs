//! Fingerprint store abstraction.
//!
//! The [`FingerprintStore`] is the sole record of what is currently live in
//! the remote store. It is read in full once per pass and written one id at
//! a time, immediately after each confirmed remote mutation, so that a crash
//! at any point leaves every id in its last committed state.
//!
//! Implementations must make each single-key write atomic and durable
//! before returning `Ok`. No multi-key transactions are required.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::ContentFingerprint;

/// Abstract durable key-value store of content fingerprints.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_all`](FingerprintStore::get_all) | Snapshot every fingerprint, keyed by content id |
/// | [`put`](FingerprintStore::put) | Insert or overwrite one fingerprint |
/// | [`remove`](FingerprintStore::remove) | Drop one fingerprint |
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn get_all(&self) -> StoreResult<HashMap<String, ContentFingerprint>>;

    async fn put(&self, fingerprint: &ContentFingerprint) -> StoreResult<()>;

    /// Removing an absent id is not an error.
    async fn remove(&self, id: &str) -> StoreResult<()>;
}
