//! In-memory [`FingerprintStore`] implementation for testing.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Writes can be made to fail
//! after a given number of successes to exercise the pass-abort path.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::models::ContentFingerprint;

use super::FingerprintStore;

/// In-memory fingerprint store.
pub struct InMemoryFingerprintStore {
    entries: RwLock<HashMap<String, ContentFingerprint>>,
    /// Remaining writes before every write fails; `None` never fails.
    writes_before_failure: RwLock<Option<usize>>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            writes_before_failure: RwLock::new(None),
        }
    }

    /// Pre-populate the store, as if earlier passes had committed these.
    pub fn with_entries(entries: impl IntoIterator<Item = ContentFingerprint>) -> Self {
        let store = Self::new();
        {
            let mut map = store.entries.write().unwrap();
            for fp in entries {
                map.insert(fp.id.clone(), fp);
            }
        }
        store
    }

    /// Let `n` more writes succeed, then fail every write after that.
    pub fn fail_writes_after(&self, n: usize) {
        *self.writes_before_failure.write().unwrap() = Some(n);
    }

    pub fn get(&self, id: &str) -> Option<ContentFingerprint> {
        self.entries.read().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_write(&self) -> StoreResult<()> {
        let mut budget = self.writes_before_failure.write().unwrap();
        match budget.as_mut() {
            Some(0) => Err(StoreError::Backend("injected write failure".into())),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Default for InMemoryFingerprintStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn get_all(&self) -> StoreResult<HashMap<String, ContentFingerprint>> {
        Ok(self.entries.read().unwrap().clone())
    }

    async fn put(&self, fingerprint: &ContentFingerprint) -> StoreResult<()> {
        self.check_write()?;
        self.entries
            .write()
            .unwrap()
            .insert(fingerprint.id.clone(), fingerprint.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> StoreResult<()> {
        self.check_write()?;
        self.entries.write().unwrap().remove(id);
        Ok(())
    }
}
