//! Remote store capability.
//!
//! The [`RemoteStore`] trait is the only surface through which the engine
//! mutates the searchable store. Implementations classify every failure as
//! [`RemoteError::Transient`] or [`RemoteError::Permanent`]; the executor
//! decides what to retry based on that classification alone.
//!
//! Implementations must not assume all-or-nothing batch semantics: each
//! call stands alone and may fail independently of concurrent calls.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::ContentNode;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload a new node, returning the identifier the store assigned.
    async fn create(&self, node: &ContentNode) -> Result<String, RemoteError>;

    /// Replace the content stored under `remote_id`.
    ///
    /// Returns `Some(new_id)` when the store could only replace the object
    /// under a fresh identifier, `None` when `remote_id` remains valid.
    async fn update(
        &self,
        remote_id: &str,
        node: &ContentNode,
    ) -> Result<Option<String>, RemoteError>;

    /// Remove `remote_id`. Removing an object that no longer exists succeeds.
    async fn delete(&self, remote_id: &str) -> Result<(), RemoteError>;

    /// List the identifiers of every object currently held by the store.
    async fn list(&self) -> Result<Vec<String>, RemoteError>;
}

/// In-memory remote store for tests.
///
/// Records every call in order, can hand out fresh identifiers on update,
/// and can be scripted to fail specific content ids.
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    replace_on_update: bool,
}

#[derive(Default)]
struct RemoteState {
    objects: HashMap<String, ContentNode>,
    next_id: u64,
    calls: Vec<String>,
    scripted: HashMap<String, VecDeque<RemoteError>>,
    always_fail: HashMap<String, RemoteError>,
}

impl RemoteState {
    fn allocate(&mut self) -> String {
        self.next_id += 1;
        format!("remote-{}", self.next_id)
    }

    /// Pop the next scripted failure for a content id, if any.
    fn injected(&mut self, content_id: &str) -> Option<RemoteError> {
        if let Some(err) = self.always_fail.get(content_id) {
            return Some(err.clone());
        }
        let queue = self.scripted.get_mut(content_id)?;
        let err = queue.pop_front();
        if queue.is_empty() {
            self.scripted.remove(content_id);
        }
        err
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote that re-uploads on update and returns the new identifier.
    pub fn replacing() -> Self {
        Self {
            replace_on_update: true,
            ..Self::default()
        }
    }

    /// Fail the next `errors.len()` calls touching `content_id`, in order.
    pub fn fail_next(&self, content_id: &str, errors: Vec<RemoteError>) {
        let mut state = self.state.lock().unwrap();
        state
            .scripted
            .entry(content_id.to_string())
            .or_default()
            .extend(errors);
    }

    /// Fail every call touching `content_id` with `error`.
    pub fn fail_always(&self, content_id: &str, error: RemoteError) {
        let mut state = self.state.lock().unwrap();
        state.always_fail.insert(content_id.to_string(), error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.scripted.clear();
        state.always_fail.clear();
    }

    /// Every call so far as `"<verb> <content id>"`, in arrival order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// The node currently stored under `remote_id`.
    pub fn get(&self, remote_id: &str) -> Option<ContentNode> {
        self.state.lock().unwrap().objects.get(remote_id).cloned()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn create(&self, node: &ContentNode) -> Result<String, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create {}", node.id));
        if let Some(err) = state.injected(&node.id) {
            return Err(err);
        }
        let remote_id = state.allocate();
        state.objects.insert(remote_id.clone(), node.clone());
        Ok(remote_id)
    }

    async fn update(
        &self,
        remote_id: &str,
        node: &ContentNode,
    ) -> Result<Option<String>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("update {}", node.id));
        if let Some(err) = state.injected(&node.id) {
            return Err(err);
        }
        if !state.objects.contains_key(remote_id) {
            return Err(RemoteError::Permanent(format!(
                "no remote object '{}'",
                remote_id
            )));
        }
        if self.replace_on_update {
            state.objects.remove(remote_id);
            let fresh = state.allocate();
            state.objects.insert(fresh.clone(), node.clone());
            Ok(Some(fresh))
        } else {
            state.objects.insert(remote_id.to_string(), node.clone());
            Ok(None)
        }
    }

    async fn delete(&self, remote_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        let content_id = state
            .objects
            .get(remote_id)
            .map(|n| n.id.clone())
            .unwrap_or_else(|| remote_id.to_string());
        state.calls.push(format!("delete {}", content_id));
        if let Some(err) = state.injected(&content_id) {
            return Err(err);
        }
        state.objects.remove(remote_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, RemoteError> {
        let mut ids: Vec<String> = self.state.lock().unwrap().objects.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
