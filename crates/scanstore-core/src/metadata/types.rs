//! Metadata record types persisted in the index file.

use crate::config::StoreConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Physical dimensions of a scanned asset, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    pub length: f64,
}

/// Optional structured annotation for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadataRecord {
    /// Domain tag, e.g. "living_room" or "chair".
    pub category: String,
    /// Capture type, e.g. "full_room" or "object".
    #[serde(default, rename = "roomType", alias = "subtype")]
    pub subtype: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AssetMetadataRecord {
    /// Create a record with the given domain category, stamped now.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subtype: None,
            created_at: Utc::now(),
            dimensions: None,
            tags: Vec::new(),
            notes: None,
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_dimensions(mut self, width: f64, height: f64, length: f64) -> Self {
        self.dimensions = Some(Dimensions {
            width,
            height,
            length,
        });
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Root structure of the index file.
///
/// Records live under `rooms` for compatibility with indexes written by
/// earlier app versions, which only annotated room scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub version: String,
    #[serde(default, rename = "rooms")]
    pub records: BTreeMap<String, AssetMetadataRecord>,
}

impl Default for IndexDocument {
    fn default() -> Self {
        Self {
            version: StoreConfig::INDEX_VERSION.to_string(),
            records: BTreeMap::new(),
        }
    }
}

impl IndexDocument {
    pub fn get(&self, filename: &str) -> Option<&AssetMetadataRecord> {
        self.records.get(filename)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
