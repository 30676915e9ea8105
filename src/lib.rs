//! # corpus-sync
//!
//! Incremental synchronization of a hierarchical help-center corpus into a
//! remote vector store.
//!
//! Each pass fetches the full content tree, compares it against the
//! fingerprints recorded by the previous pass, and applies only the
//! difference: new nodes are uploaded, changed nodes replaced, removed
//! nodes deleted. Parents are always uploaded before their children and
//! children deleted before their parents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │ ContentSource│──▶│   Diff   │──▶│ BatchExecutor │──▶│ RemoteStore  │
//! │ HC / snapshot│   │  engine  │   │ stages, retry │   │ vector store │
//! └──────────────┘   └────┬─────┘   └───────┬───────┘   └──────────────┘
//!                         │ prior           │ confirmed results
//!                         │                 ▼
//!                    ┌────┴─────────────────────┐
//!                    │ FingerprintStore (SQLite)│
//!                    └──────────────────────────┘
//! ```
//!
//! The pure pieces (models, hashing, diff, staging, capability traits and
//! in-memory test doubles) live in `corpus-sync-core`; this crate adds the
//! I/O implementations, the executor, the orchestrator and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! csync init                # create the fingerprint database
//! csync sync --dry-run      # show what a pass would do
//! csync sync                # run one pass
//! csync verify              # compare remote listing with fingerprints
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_help_center`] | Help-center REST source |
//! | [`connector_snapshot`] | JSON snapshot source |
//! | [`vector_store`] | Vector-store remote |
//! | [`executor`] | Staged, retrying batch executor |
//! | [`ingest`] | Pass orchestration and `csync sync` |
//! | [`sqlite_store`] | SQLite fingerprint store |
//! | [`fingerprints`] | `csync fingerprints` |
//! | [`verify`] | Drift check |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod connector_help_center;
pub mod connector_snapshot;
pub mod db;
pub mod executor;
pub mod fingerprints;
pub mod ingest;
pub mod migrate;
pub mod sqlite_store;
pub mod vector_store;
pub mod verify;

pub use corpus_sync_core as core;
