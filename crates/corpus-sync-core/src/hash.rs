//! Body normalization and content fingerprint hashing.
//!
//! The content hash is the SHA-256 of a node's kind, title and normalized
//! body. Each field is length-prefixed before hashing so that moving bytes
//! between the title and the body always changes the digest. The node's id
//! and parent are deliberately excluded: two nodes equal in
//! `(kind, title, body)` hash identically regardless of where or when they
//! were fetched.
//!
//! # Example
//!
//! ```rust
//! use corpus_sync_core::hash::content_hash;
//! use corpus_sync_core::models::{ContentNode, NodeKind};
//!
//! let a = ContentNode::new("a1", Some("s1"), NodeKind::Article, "Setup", "Step one.\r\n");
//! let b = ContentNode::new("a9", None, NodeKind::Article, "Setup", "Step one.");
//! assert_eq!(content_hash(&a), content_hash(&b));
//! ```

use sha2::{Digest, Sha256};

use crate::models::ContentNode;

/// Canonicalize a body so that cosmetic whitespace differences between
/// fetches do not produce spurious updates.
///
/// - CRLF and lone CR become LF.
/// - Trailing whitespace is trimmed from every line.
/// - Leading and trailing blank lines are removed.
pub fn normalize_body(body: &str) -> String {
    let unified = body.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.lines().map(str::trim_end).collect();

    let start = lines.iter().position(|l| !l.is_empty());
    let end = lines.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}

/// Compute the lower-case hex SHA-256 fingerprint of a node's content.
pub fn content_hash(node: &ContentNode) -> String {
    let body = normalize_body(&node.body);
    let mut hasher = Sha256::new();
    for field in [node.kind.as_str(), node.title.trim(), body.as_str()] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
