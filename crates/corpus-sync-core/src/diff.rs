//! Diff engine: current tree + prior fingerprints → ordered operations.
//!
//! # Algorithm
//!
//! 1. Partition ids into *new* (no fingerprint), *changed* (hash differs),
//!    *unchanged* (hash matches, no operation) and *removed* (fingerprint
//!    with no node in the current tree).
//!    An unchanged node whose parent link moved gets a refreshed
//!    fingerprint instead of an operation; the hash never covers the parent.
//! 2. Emit `Create` for new ids, `Update` for changed ids and `Delete` for
//!    removed ids, the latter two carrying the stored remote id.
//! 3. Order creates and updates by tree depth ascending (parents first),
//!    then deletes by depth descending (children first). Every upsert
//!    precedes every delete.
//! 4. Break ties within a depth by id, ascending.
//!
//! Depth is computed by walking parent links, which is enough because the
//! source guarantees a forest. A node whose parent is missing from the tree
//! it was computed over is placed at depth 0. Removed nodes take their depth
//! from the parent links recorded in the prior fingerprints.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use corpus_sync_core::diff::{diff, KindChangePolicy};
//! use corpus_sync_core::models::{ContentNode, NodeKind};
//!
//! let tree = vec![
//!     ContentNode::new("art1", Some("sec1"), NodeKind::Article, "Install", "..."),
//!     ContentNode::new("sec1", None, NodeKind::Section, "Setup", ""),
//! ];
//! let plan = diff(&tree, &HashMap::new(), KindChangePolicy::Update);
//! let order: Vec<String> = plan.operations.iter().map(|op| op.to_string()).collect();
//! assert_eq!(order, vec!["create(sec1)", "create(art1)"]);
//! ```

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::warn;

use crate::hash::content_hash;
use crate::models::{ContentFingerprint, ContentNode, SyncOperation};

/// What to do when a node keeps its id but changes kind between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindChangePolicy {
    /// Treat it like any other content change: a single `Update`.
    #[default]
    Update,
    /// Remove the old remote object and upload a fresh one.
    Replace,
}

/// How the current tree partitioned against the prior fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Nodes whose parent was absent from the fetched tree.
    pub unparented: usize,
    /// Later occurrences of an id already seen in the tree.
    pub duplicates: usize,
}

/// Ordered operations plus the partition counts that produced them.
#[derive(Debug, Clone, Default)]
pub struct DiffPlan {
    pub operations: Vec<SyncOperation>,
    /// Fingerprints of unchanged nodes that moved to a new parent. They are
    /// written back without touching the remote store.
    pub refreshes: Vec<ContentFingerprint>,
    pub stats: DiffStats,
}

impl DiffPlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.refreshes.is_empty()
    }
}

/// Compute the dependency-ordered operations that bring the remote store
/// from the state recorded in `prior` to `current`.
pub fn diff(
    current: &[ContentNode],
    prior: &HashMap<String, ContentFingerprint>,
    policy: KindChangePolicy,
) -> DiffPlan {
    let mut stats = DiffStats::default();

    // First occurrence of an id wins.
    let mut seen = HashSet::new();
    let mut nodes: Vec<&ContentNode> = Vec::with_capacity(current.len());
    for node in current {
        if seen.insert(node.id.as_str()) {
            nodes.push(node);
        } else {
            warn!(id = %node.id, "duplicate node id in fetched tree; keeping first occurrence");
            stats.duplicates += 1;
        }
    }

    let current_parents: HashMap<&str, Option<&str>> = nodes
        .iter()
        .map(|n| (n.id.as_str(), n.parent_id.as_deref()))
        .collect();
    stats.unparented = nodes
        .iter()
        .filter(|n| {
            n.parent_id
                .as_deref()
                .is_some_and(|p| !current_parents.contains_key(p))
        })
        .count();
    let current_depths = depths(&current_parents);

    let prior_parents: HashMap<&str, Option<&str>> = prior
        .values()
        .map(|fp| (fp.id.as_str(), fp.parent_id.as_deref()))
        .collect();
    let prior_depths = depths(&prior_parents);

    let mut upserts = Vec::new();
    let mut deletes = Vec::new();
    let mut refreshes = Vec::new();

    for node in &nodes {
        let depth = current_depths[node.id.as_str()];
        let Some(fp) = prior.get(&node.id) else {
            stats.new += 1;
            upserts.push(SyncOperation::Create {
                node: (*node).clone(),
                depth,
            });
            continue;
        };

        if fp.content_hash == content_hash(node) {
            stats.unchanged += 1;
            if fp.parent_id != node.parent_id {
                refreshes.push(ContentFingerprint {
                    parent_id: node.parent_id.clone(),
                    ..fp.clone()
                });
            }
            continue;
        }

        stats.changed += 1;
        if fp.kind != node.kind && policy == KindChangePolicy::Replace {
            deletes.push(SyncOperation::Delete {
                id: fp.id.clone(),
                remote_id: fp.remote_id.clone(),
                depth: prior_depths[fp.id.as_str()],
            });
            upserts.push(SyncOperation::Create {
                node: (*node).clone(),
                depth,
            });
        } else {
            upserts.push(SyncOperation::Update {
                node: (*node).clone(),
                remote_id: fp.remote_id.clone(),
                depth,
            });
        }
    }

    for fp in prior.values() {
        if current_parents.contains_key(fp.id.as_str()) {
            continue;
        }
        stats.removed += 1;
        deletes.push(SyncOperation::Delete {
            id: fp.id.clone(),
            remote_id: fp.remote_id.clone(),
            depth: prior_depths[fp.id.as_str()],
        });
    }

    upserts.sort_by(|a, b| (a.depth(), a.id()).cmp(&(b.depth(), b.id())));
    deletes.sort_by(|a, b| (Reverse(a.depth()), a.id()).cmp(&(Reverse(b.depth()), b.id())));

    let mut operations = upserts;
    operations.extend(deletes);
    refreshes.sort_by(|a, b| a.id.cmp(&b.id));
    DiffPlan {
        operations,
        refreshes,
        stats,
    }
}

/// Depth of every id in a parent-link map.
///
/// Ids whose parent is `None` or absent from the map are roots (depth 0).
/// A parent cycle is broken at the node where it is detected, which is then
/// treated as a root.
fn depths<'a>(parents: &HashMap<&'a str, Option<&'a str>>) -> HashMap<&'a str, usize> {
    let mut memo: HashMap<&'a str, usize> = HashMap::with_capacity(parents.len());

    let mut ids: Vec<&'a str> = parents.keys().copied().collect();
    ids.sort_unstable();

    for start in ids {
        if memo.contains_key(start) {
            continue;
        }

        let mut path: Vec<&'a str> = Vec::new();
        let mut on_path: HashSet<&'a str> = HashSet::new();
        let mut cur = start;
        let top_depth = loop {
            path.push(cur);
            on_path.insert(cur);
            match parents.get(cur).copied().flatten() {
                Some(p) if parents.contains_key(p) => {
                    if let Some(&d) = memo.get(p) {
                        break d + 1;
                    }
                    if on_path.contains(p) {
                        warn!(
                            id = cur,
                            parent = p,
                            "parent cycle detected; treating node as a root"
                        );
                        break 0;
                    }
                    cur = p;
                }
                _ => break 0,
            }
        };

        let len = path.len();
        for (i, id) in path.into_iter().enumerate() {
            memo.insert(id, top_depth + (len - 1 - i));
        }
    }

    memo
}
