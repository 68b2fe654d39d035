//! Core engine for aurelian: local-first task management on CRDT-backed
//! workspace documents.
//!
//! Each workspace is one automerge document holding todos and their
//! comments. Peers edit their copies offline and reconcile over the sync
//! protocol without losing concurrent work. This crate houses everything
//! below the adapters: validation, the document model, the durable
//! directory store and the sync engine; the CLI and HTTP surfaces live in
//! their own crates.

#![warn(missing_docs)]

/// Resolution of storage root, current workspace and author
pub mod config;

/// Error (common error types)
pub mod error;

/// Workspace document model: todos, comments, annotations, text splice
pub mod model;

/// Directory-backed persistence with atomic writes and write locking
pub mod store;

/// Bidirectional CRDT synchronization over a duplex message channel
pub mod sync;

/// Unicode validation and NFC normalization
pub mod unicode;

/// Field validators invoked before any mutation
pub mod validate;

pub use error::{AuError, Result};
