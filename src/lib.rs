//! # revidx - commit diffs and write-ahead logging for segmented stores
//!
//! revidx compares immutable point-in-time commits of a segmented document
//! store, reconciles two such comparisons against a common ancestor, and keeps
//! a write-ahead log so that uncommitted index changes survive a crash.
//!
//! ## Architecture
//!
//! - [`diff`] - per-document change classification between two commits, and
//!   three-way merges of two diffs
//! - [`translog`] - generation-numbered write-ahead log, checkpoints, replay
//! - [`index`] - the collaborator traits the core works against, plus a
//!   file-backed reference store implementing them
//! - [`engine`] - [`IndexStore`], one writer bound to one translog
//! - [`config`] - `revidx.json` store configuration
//! - [`error`] - error types
//!
//! ## Quick Start
//!
//! ```ignore
//! use revidx::diff::DiffCalculator;
//! use revidx::engine::IndexStore;
//! use revidx::index::Document;
//! use revidx::translog::Operation;
//! use std::path::Path;
//!
//! let mut store = IndexStore::open("main", Path::new("/var/lib/revidx/main"))?;
//! store.recover()?;
//!
//! let before = store.last_generation().unwrap();
//! store.execute(&Operation::index("c-42", Document::new("concept").relevant(42)))?;
//! store.commit()?;
//!
//! let diff = store.diff(before, store.last_generation().unwrap())?;
//! assert!(diff.new_ids().contains(42));
//! ```

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod index;
pub mod translog;
pub mod utils;

pub use engine::IndexStore;
