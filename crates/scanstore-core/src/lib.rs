//! Scanstore Core - Headless local store for scanned 3D assets.
//!
//! This crate durably saves room scans and furniture captures together with
//! derived thumbnails and structured metadata, and keeps the three
//! consistent across rename and delete. It has no UI, rendering or network
//! layer; the thumbnail renderer is injected through the [`Renderer`] trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use scanstore_core::{AssetCategory, AssetMetadataRecord, AssetService};
//!
//! #[tokio::main]
//! async fn main() -> scanstore_core::Result<()> {
//!     let service = AssetService::open("/path/to/store").await?;
//!
//!     let asset = service
//!         .save_asset(
//!             "/tmp/capture.usdz".as_ref(),
//!             AssetCategory::Furniture,
//!             Some("ChairScan"),
//!             Some(AssetMetadataRecord::new("chair")),
//!         )
//!         .await?;
//!     println!("Stored {}", asset.filename);
//!
//!     for entry in service.list_assets(AssetCategory::Furniture).await? {
//!         println!("{} ({} bytes)", entry.asset.filename, entry.asset.size_bytes);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod metadata;
pub mod service;
pub mod thumbnail;
pub mod types;

// Re-export commonly used types
pub use config::{AssetCategory, StoreConfig, ThumbnailConfig};
pub use content::ContentStore;
pub use error::{Result, StoreError};
pub use metadata::{AssetMetadataRecord, Dimensions, IndexDocument, MetadataIndex};
pub use service::{AssetService, AssetServiceBuilder};
pub use thumbnail::{NullRenderer, Renderer, Thumbnail, ThumbnailCache};
pub use types::{Asset, AssetEntry, ReconcileReport, StorageStats};
