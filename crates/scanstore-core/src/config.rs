//! Centralized configuration for the asset store.
//!
//! This module provides the on-disk naming constants, thumbnail defaults and
//! the storage categories assets are partitioned into.

use serde::{Deserialize, Serialize};

/// On-disk layout and index configuration.
pub struct StoreConfig;

impl StoreConfig {
    pub const INDEX_FILENAME: &'static str = "asset_metadata.json";
    pub const INDEX_VERSION: &'static str = "1.0";
    pub const BACKUP_EXTENSION: &'static str = "backup";
    /// Extensions the content store accepts and lists, lowercase.
    pub const ASSET_EXTENSIONS: &'static [&'static str] = &[
        "usdz", "usd", "usda", "usdc", "obj", "glb", "gltf", "ply", "stl", "reality",
    ];
    pub const FALLBACK_BASE_NAME: &'static str = "asset";
}

/// Thumbnail cache configuration.
pub struct ThumbnailConfig;

impl ThumbnailConfig {
    pub const SUFFIX: &'static str = "_thumb";
    pub const EXTENSION: &'static str = "png";
    pub const DEFAULT_SIZE: u32 = 256;
    pub const DEFAULT_MEMORY_CAPACITY: u64 = 256;
}

/// Top-level storage partition for assets.
///
/// Distinct from the free-form `category` tag stored inside a metadata
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Furniture,
    Room,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 2] = [AssetCategory::Furniture, AssetCategory::Room];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Furniture => "furniture",
            AssetCategory::Room => "room",
        }
    }

    pub fn folder_name(&self) -> &'static str {
        match self {
            AssetCategory::Furniture => "furniture",
            AssetCategory::Room => "rooms",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "furniture" => Some(AssetCategory::Furniture),
            "room" | "rooms" => Some(AssetCategory::Room),
            _ => None,
        }
    }
}

impl std::fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether `ext` (without the dot) is an accepted asset extension.
pub fn is_asset_extension(ext: &str) -> bool {
    let ext = ext.to_lowercase();
    StoreConfig::ASSET_EXTENSIONS.contains(&ext.as_str())
}
