//! Metadata persistence.
//!
//! This module provides:
//! - Atomic JSON file operations
//! - The per-root metadata index with a serialized writer
//! - Record types stored in the index

mod atomic;
mod index;
mod types;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use index::MetadataIndex;
pub use types::{AssetMetadataRecord, Dimensions, IndexDocument};
