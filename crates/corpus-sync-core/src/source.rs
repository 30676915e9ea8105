//! Content source capability.
//!
//! A [`ContentSource`] produces the complete current content forest for one
//! pass. Partial trees are never returned: any failure to fetch part of the
//! tree must fail the whole fetch, because diffing a partial tree would
//! delete everything that was missing from it.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::ContentNode;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Short label for logs (e.g. `"help-center"`).
    fn name(&self) -> &str;

    /// Fetch every node of the current tree.
    async fn fetch_tree(&self) -> Result<Vec<ContentNode>, SourceError>;
}

/// In-memory source for tests and embedding callers.
///
/// The tree can be replaced between passes, or the source marked
/// unavailable to exercise the pass-abort path.
pub struct StaticSource {
    tree: RwLock<Option<Vec<ContentNode>>>,
}

impl StaticSource {
    pub fn new(tree: Vec<ContentNode>) -> Self {
        Self {
            tree: RwLock::new(Some(tree)),
        }
    }

    /// A source whose every fetch fails.
    pub fn unavailable() -> Self {
        Self {
            tree: RwLock::new(None),
        }
    }

    pub fn set_tree(&self, tree: Vec<ContentNode>) {
        *self.tree.write().unwrap() = Some(tree);
    }

    pub fn set_unavailable(&self) {
        *self.tree.write().unwrap() = None;
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_tree(&self) -> Result<Vec<ContentNode>, SourceError> {
        self.tree
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| SourceError::Unavailable("static source marked unavailable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeKind;

    #[tokio::test]
    async fn test_static_source_swaps_tree() {
        let source = StaticSource::new(vec![ContentNode::new(
            "cat1",
            None,
            NodeKind::Category,
            "General",
            "",
        )]);
        assert_eq!(source.fetch_tree().await.unwrap().len(), 1);

        source.set_tree(Vec::new());
        assert!(source.fetch_tree().await.unwrap().is_empty());

        source.set_unavailable();
        assert!(source.fetch_tree().await.is_err());
    }
}
