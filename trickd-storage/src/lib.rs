//! # trickd-storage
//!
//! Storage layer for trickd.
//!
//! This crate provides:
//! - Atomic per-game snapshot files with checksums
//! - Recovery of all games on startup
//! - A write-through `GameStore`

pub mod error;
pub mod snapshot;
pub mod store;

pub use error::StorageError;
pub use snapshot::{SnapshotDir, SnapshotMeta};
pub use store::DurableStore;
