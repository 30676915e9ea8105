//! Snapshot connector.
//!
//! Reads the content tree from a JSON file holding an array of nodes:
//!
//! ```json
//! [
//!   {"id": "cat1", "kind": "category", "title": "General"},
//!   {"id": "art1", "parent_id": "cat1", "kind": "article", "title": "Install", "body": "..."}
//! ]
//! ```
//!
//! Useful for offline runs, fixtures and dry runs against an exported tree.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use corpus_sync_core::error::SourceError;
use corpus_sync_core::hash::normalize_body;
use corpus_sync_core::models::ContentNode;
use corpus_sync_core::source::ContentSource;

/// A [`ContentSource`] reading a JSON snapshot file on every fetch.
pub struct SnapshotSource {
    path: PathBuf,
}

impl SnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContentSource for SnapshotSource {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn fetch_tree(&self) -> Result<Vec<ContentNode>, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Unavailable(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let mut nodes: Vec<ContentNode> = serde_json::from_str(&raw).map_err(|e| {
            SourceError::Unavailable(format!("invalid snapshot {}: {}", self.path.display(), e))
        })?;
        for node in &mut nodes {
            node.body = normalize_body(&node.body);
        }
        info!(path = %self.path.display(), nodes = nodes.len(), "snapshot loaded");
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_sync_core::models::NodeKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_nodes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tree.json");
        std::fs::write(
            &path,
            r#"[{"id":"cat1","kind":"category","title":"General"},
                {"id":"art1","parent_id":"cat1","kind":"article","title":"Install","body":"Run it."}]"#,
        )
        .unwrap();

        let nodes = SnapshotSource::new(&path).fetch_tree().await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind, NodeKind::Category);
        assert_eq!(nodes[0].body, "");
        assert_eq!(nodes[1].parent_id.as_deref(), Some("cat1"));
    }

    #[tokio::test]
    async fn test_bodies_are_normalized() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tree.json");
        std::fs::write(
            &path,
            r#"[{"id":"a","kind":"article","title":"A","body":"\r\nline one  \r\nline two\t\r\n\r\n"}]"#,
        )
        .unwrap();

        let nodes = SnapshotSource::new(&path).fetch_tree().await.unwrap();
        assert_eq!(nodes[0].body, "line one\nline two");
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let err = SnapshotSource::new(tmp.path().join("absent.json"))
            .fetch_tree()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tree.json");
        std::fs::write(&path, r#"[{"id":"x","kind":"folder","title":"X"}]"#).unwrap();
        assert!(SnapshotSource::new(&path).fetch_tree().await.is_err());
    }
}
