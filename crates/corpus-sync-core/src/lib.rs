//! # Corpus Sync Core
//!
//! Runtime-agnostic logic for corpus-sync: content models, fingerprint
//! hashing, the diff engine, stage planning, and the three capability
//! traits the synchronization engine is written against.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Concrete
//! sources, remotes, and durable stores live in the `corpus-sync` crate.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Content nodes, fingerprints, operations, results |
//! | [`hash`] | Body normalization and content hashing |
//! | [`diff`] | Dependency-ordered operation planning |
//! | [`stage`] | Grouping operations into sequential stages |
//! | [`error`] | Error taxonomy |
//! | [`source`] | Content source capability |
//! | [`remote`] | Remote store capability |
//! | [`store`] | Fingerprint store capability |

pub mod diff;
pub mod error;
pub mod hash;
pub mod models;
pub mod remote;
pub mod source;
pub mod stage;
pub mod store;
