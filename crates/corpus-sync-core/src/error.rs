//! Error taxonomy for the synchronization engine.
//!
//! Failures fall into two tiers. Per-operation remote failures
//! ([`RemoteError`]) are isolated: they are retried or counted, never
//! propagated. Source and fingerprint-store failures ([`SyncError`]) abort
//! the whole pass.

use thiserror::Error;

/// Result type for fingerprint store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The content source could not produce a complete tree.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("content source unavailable: {0}")]
    Unavailable(String),
}

/// A remote store operation failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network errors, timeouts, rate limiting, server errors. Retried.
    #[error("transient remote failure: {0}")]
    Transient(String),
    /// Validation errors and other client-side rejections. Never retried.
    #[error("permanent remote failure: {0}")]
    Permanent(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }

    /// Human-readable cause without the classification prefix.
    pub fn cause(&self) -> &str {
        match self {
            RemoteError::Transient(c) | RemoteError::Permanent(c) => c,
        }
    }

    /// Classify a non-success HTTP status.
    ///
    /// 408, 429 and 5xx are transient; every other status is permanent.
    pub fn from_status(status: u16, body: &str) -> Self {
        let cause = format!("HTTP {}: {}", status, body);
        if status == 408 || status == 429 || (500..600).contains(&status) {
            RemoteError::Transient(cause)
        } else {
            RemoteError::Permanent(cause)
        }
    }
}

/// A fingerprint store read or write failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fingerprint store backend error: {0}")]
    Backend(String),

    #[error("corrupt fingerprint for '{id}': {reason}")]
    Corrupt { id: String, reason: String },
}

/// Pass-aborting failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source failed before any mutation was attempted.
    #[error("content source unavailable: {0}")]
    SourceUnavailable(String),

    /// A fingerprint could not be loaded or durably recorded. Continuing
    /// would leave the store unable to tell "never uploaded" from
    /// "uploaded but not recorded".
    #[error("fingerprint store failure: {0}")]
    FingerprintStore(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(msg) => SyncError::SourceUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(RemoteError::from_status(429, "slow down").is_transient());
        assert!(RemoteError::from_status(408, "").is_transient());
        assert!(RemoteError::from_status(500, "").is_transient());
        assert!(RemoteError::from_status(503, "").is_transient());
        assert!(!RemoteError::from_status(400, "bad file").is_transient());
        assert!(!RemoteError::from_status(401, "").is_transient());
        assert!(!RemoteError::from_status(404, "").is_transient());
        assert!(!RemoteError::from_status(422, "").is_transient());
    }

    #[test]
    fn test_cause_keeps_status_and_body() {
        let err = RemoteError::from_status(400, "invalid purpose");
        assert_eq!(err.cause(), "HTTP 400: invalid purpose");
        assert_eq!(
            err.to_string(),
            "permanent remote failure: HTTP 400: invalid purpose"
        );
    }

    #[test]
    fn test_source_error_maps_to_pass_abort() {
        let err: SyncError = SourceError::Unavailable("dns".into()).into();
        assert!(matches!(err, SyncError::SourceUnavailable(ref m) if m == "dns"));
    }
}
