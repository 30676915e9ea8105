//! Core data models used throughout corpus-sync.
//!
//! These types describe the content tree fetched from a source, the
//! fingerprints persisted between passes, and the operations and results
//! that flow from the diff engine through the executor to the commit step.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a node in the category → section → article hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Category,
    Section,
    Article,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Category => "category",
            NodeKind::Section => "section",
            NodeKind::Article => "article",
        }
    }

    /// Parse the lower-case label written by [`NodeKind::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "category" => Some(NodeKind::Category),
            "section" => Some(NodeKind::Section),
            "article" => Some(NodeKind::Article),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single item of the content forest produced by a source.
///
/// `id` is assigned by the source and stable across fetches. Roots have
/// `parent_id = None`; a node whose parent is absent from the fetched tree
/// is treated as unparented rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub kind: NodeKind,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl ContentNode {
    pub fn new(
        id: impl Into<String>,
        parent_id: Option<&str>,
        kind: NodeKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            kind,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Persisted record marking a content item as live in the remote store.
///
/// `parent_id` and `kind` are recorded so that deletes can still be ordered
/// child-before-parent once the node has vanished from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFingerprint {
    pub id: String,
    pub content_hash: String,
    pub remote_id: String,
    pub parent_id: Option<String>,
    pub kind: NodeKind,
    pub updated_at: DateTime<Utc>,
}

/// Whether an operation belongs to the upsert sweep (parents first) or the
/// delete sweep (children first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Upsert,
    Delete,
}

/// One remote mutation derived by the diff engine.
///
/// `depth` is the node's distance from its root in the tree the operation
/// was derived from; it defines the stage the operation runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOperation {
    Create {
        node: ContentNode,
        depth: usize,
    },
    Update {
        node: ContentNode,
        remote_id: String,
        depth: usize,
    },
    Delete {
        id: String,
        remote_id: String,
        depth: usize,
    },
}

impl SyncOperation {
    /// Content id this operation targets.
    pub fn id(&self) -> &str {
        match self {
            SyncOperation::Create { node, .. } | SyncOperation::Update { node, .. } => &node.id,
            SyncOperation::Delete { id, .. } => id,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            SyncOperation::Create { depth, .. }
            | SyncOperation::Update { depth, .. }
            | SyncOperation::Delete { depth, .. } => *depth,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            SyncOperation::Create { .. } | SyncOperation::Update { .. } => Phase::Upsert,
            SyncOperation::Delete { .. } => Phase::Delete,
        }
    }

    /// Short verb for logs and dry-run output.
    pub fn verb(&self) -> &'static str {
        match self {
            SyncOperation::Create { .. } => "create",
            SyncOperation::Update { .. } => "update",
            SyncOperation::Delete { .. } => "delete",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.verb(), self.id())
    }
}

/// Terminal outcome of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The remote mutation was confirmed. `remote_id` is set when the store
    /// assigned a (new) identifier: always for creates, sometimes for updates.
    Success { remote_id: Option<String> },
    /// Transient failures persisted through every allowed attempt.
    TransientFailure { cause: String, attempts: u32 },
    /// The remote rejected the operation; it was not retried.
    PermanentFailure { cause: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Pairing of an operation with its terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub operation: SyncOperation,
    pub outcome: Outcome,
}

/// Counts reported at the end of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub unchanged: u64,
    pub failed: u64,
    /// Set when the pass stopped at a stage boundary on request.
    pub cancelled: bool,
}

impl PassSummary {
    /// True when every planned operation ran and none failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }

    /// Fold one result into the counts.
    pub fn record(&mut self, result: &OperationResult) {
        if !result.outcome.is_success() {
            self.failed += 1;
            return;
        }
        match result.operation {
            SyncOperation::Create { .. } => self.created += 1,
            SyncOperation::Update { .. } => self.updated += 1,
            SyncOperation::Delete { .. } => self.deleted += 1,
        }
    }
}
