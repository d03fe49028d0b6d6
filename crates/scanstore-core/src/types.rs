//! Shared value types returned by the store.

use crate::config::AssetCategory;
use crate::metadata::AssetMetadataRecord;
use crate::thumbnail::Thumbnail;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// A stored asset blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Unique within its category folder; also the metadata index key.
    pub filename: String,
    pub path: PathBuf,
    pub category: AssetCategory,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// One row of the asset listing.
#[derive(Debug, Clone)]
pub struct AssetEntry {
    pub asset: Asset,
    pub metadata: Option<AssetMetadataRecord>,
    /// Present only if the thumbnail was already in memory.
    pub thumbnail: Option<Thumbnail>,
}

/// Count and total size of the assets in one or more categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub count: usize,
    pub total_bytes: u64,
}

impl std::ops::Add for StorageStats {
    type Output = StorageStats;

    fn add(self, other: StorageStats) -> StorageStats {
        StorageStats {
            count: self.count + other.count,
            total_bytes: self.total_bytes + other.total_bytes,
        }
    }
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Metadata keys with no matching asset file.
    pub removed_records: Vec<String>,
    /// Thumbnail siblings whose asset no longer exists.
    pub removed_thumbnails: Vec<PathBuf>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.removed_records.is_empty() && self.removed_thumbnails.is_empty()
    }
}
