//! Asset service: the composition root the rest of the app talks to.
//!
//! Keeps the content store, thumbnail cache and metadata index in step.
//! Blob operations decide success. Thumbnail and metadata side effects that
//! fail afterwards are logged and left for [`AssetService::reconcile`] or
//! lazy regeneration to heal.

mod builder;

pub use builder::AssetServiceBuilder;

use crate::config::AssetCategory;
use crate::content::naming::thumbnail_owner_stem;
use crate::content::{thumbnail_path, ContentStore};
use crate::error::{Result, StoreError};
use crate::metadata::{AssetMetadataRecord, MetadataIndex};
use crate::thumbnail::{Thumbnail, ThumbnailCache};
use crate::types::{Asset, AssetEntry, ReconcileReport, StorageStats};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Local store for scanned 3D assets, their thumbnails and metadata.
///
/// Construct one per store root (usually once per process) and share it.
pub struct AssetService {
    content: ContentStore,
    index: MetadataIndex,
    thumbnails: Arc<ThumbnailCache>,
}

impl AssetService {
    /// Create a builder for AssetService.
    pub fn builder(root: impl Into<PathBuf>) -> AssetServiceBuilder {
        AssetServiceBuilder::new(root)
    }

    /// Open a store at `root` with default options.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(root).build().await
    }

    pub(crate) fn from_parts(
        content: ContentStore,
        index: MetadataIndex,
        thumbnails: Arc<ThumbnailCache>,
    ) -> Self {
        Self {
            content,
            index,
            thumbnails,
        }
    }

    pub fn root(&self) -> &Path {
        self.content.root()
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    pub fn thumbnails(&self) -> &Arc<ThumbnailCache> {
        &self.thumbnails
    }

    // ========================================
    // Asset lifecycle
    // ========================================

    /// Store a copy of `source` and optionally annotate it.
    ///
    /// Returns once the blob is durably written. Thumbnail generation
    /// continues in the background; a failed metadata write is logged only.
    pub async fn save_asset(
        &self,
        source: &Path,
        category: AssetCategory,
        custom_name: Option<&str>,
        metadata: Option<AssetMetadataRecord>,
    ) -> Result<Asset> {
        let asset = self.content.save(source, category, custom_name).await?;

        self.thumbnails.spawn_generate(&asset.path);

        if let Some(record) = metadata {
            if let Err(e) = self.index.upsert(&asset.filename, record).await {
                warn!("Saved {} but failed to store its metadata: {}", asset.filename, e);
            }
        }

        Ok(asset)
    }

    /// Rename an asset, then carry its thumbnail and metadata along.
    ///
    /// The blob moves first; if that fails nothing else has changed.
    pub async fn rename_asset(&self, path: &Path, new_name: &str) -> Result<PathBuf> {
        let new_path = self.content.rename(path, new_name).await?;
        if new_path == path {
            return Ok(new_path);
        }

        self.thumbnails.invalidate(path);
        self.thumbnails.invalidate(&new_path);
        if let Err(e) = move_if_exists(thumbnail_path(path), thumbnail_path(&new_path)).await {
            warn!("Failed to move thumbnail for {}: {}", path.display(), e);
        }

        let old_filename = filename_of(path)?;
        let new_filename = filename_of(&new_path)?;
        if let Err(e) = self.index.rename_key(&old_filename, &new_filename).await {
            warn!(
                "Failed to move metadata {} -> {}: {}",
                old_filename, new_filename, e
            );
        }

        info!("Renamed asset {} -> {}", old_filename, new_filename);
        Ok(new_path)
    }

    /// Delete an asset with its thumbnail and metadata.
    ///
    /// Deleting an asset that is already gone succeeds. Paths outside the
    /// store's category folders are rejected before anything is touched.
    pub async fn delete_asset(&self, path: &Path) -> Result<()> {
        self.content.require_category(path)?;
        let filename = filename_of(path)?;

        self.thumbnails.invalidate(path);
        if let Err(e) = remove_if_exists(thumbnail_path(path)).await {
            warn!("Failed to delete thumbnail for {}: {}", filename, e);
        }
        if let Err(e) = self.index.remove(&filename).await {
            warn!("Failed to delete metadata for {}: {}", filename, e);
        }

        match self.content.delete(path).await {
            Ok(()) => info!("Deleted asset {}", filename),
            Err(e) if e.is_benign() => debug!("Asset {} was already gone", filename),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    // ========================================
    // Read path
    // ========================================

    /// Assets of one category with their metadata and any thumbnail already
    /// in memory. Missing thumbnails are queued for background generation.
    pub async fn list_assets(&self, category: AssetCategory) -> Result<Vec<AssetEntry>> {
        let assets = self.content.list_assets(category).await?;
        let index = self.index.load().await;

        Ok(assets
            .into_iter()
            .map(|asset| AssetEntry {
                metadata: index.get(&asset.filename).cloned(),
                thumbnail: self.peek_thumbnail(&asset.path),
                asset,
            })
            .collect())
    }

    /// Metadata for an asset, by path or bare filename.
    pub async fn get_metadata(&self, asset: impl AsRef<Path>) -> Option<AssetMetadataRecord> {
        let filename = filename_of(asset.as_ref()).ok()?;
        self.index.get(&filename).await
    }

    /// Attach or replace the metadata of an existing asset.
    pub async fn set_metadata(&self, path: &Path, record: AssetMetadataRecord) -> Result<()> {
        self.content.require_category(path)?;
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(StoreError::NotFound {
                path: path.to_path_buf(),
            });
        }
        self.index.upsert(&filename_of(path)?, record).await
    }

    /// Remove the metadata of an asset. Returns whether there was any.
    pub async fn remove_metadata(&self, asset: impl AsRef<Path>) -> Result<bool> {
        self.index.remove(&filename_of(asset.as_ref())?).await
    }

    /// Thumbnail if it is already in memory; otherwise `None` right away,
    /// with generation started in the background.
    pub fn peek_thumbnail(&self, path: &Path) -> Option<Thumbnail> {
        let hit = self.thumbnails.peek(path);
        if hit.is_none() {
            self.thumbnails.spawn_generate(path);
        }
        hit
    }

    /// Thumbnail for an asset, waiting for disk or renderer on a miss.
    pub async fn thumbnail(&self, path: &Path) -> Option<Thumbnail> {
        self.thumbnails.get(path).await
    }

    /// Count and total size of one category.
    pub async fn storage_stats(&self, category: AssetCategory) -> Result<StorageStats> {
        let assets = self.content.list_assets(category).await?;
        Ok(StorageStats {
            count: assets.len(),
            total_bytes: assets.iter().map(|a| a.size_bytes).sum(),
        })
    }

    /// Count and total size across every category.
    pub async fn storage_stats_all(&self) -> Result<StorageStats> {
        let mut total = StorageStats::default();
        for category in AssetCategory::ALL {
            total = total + self.storage_stats(category).await?;
        }
        Ok(total)
    }

    // ========================================
    // Maintenance
    // ========================================

    /// Prune metadata records and thumbnail siblings with no asset file.
    ///
    /// Needs a full recursive listing, so run it on demand rather than on
    /// every read.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let asset_paths = self.content.scan_asset_paths().await?;
        let filenames: HashSet<String> = asset_paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect();

        let removed_records = self.index.reconcile(&filenames).await?;

        // Thumbnails pair with assets by folder + stem
        let live_stems: HashSet<PathBuf> =
            asset_paths.iter().map(|p| p.with_extension("")).collect();
        let mut removed_thumbnails = Vec::new();
        for thumb in self.content.scan_thumbnail_paths().await? {
            let Some(owner) = thumbnail_owner_stem(&thumb) else {
                continue;
            };
            if live_stems.contains(&thumb.with_file_name(&owner)) {
                continue;
            }
            match remove_if_exists(thumb.clone()).await {
                Ok(true) => removed_thumbnails.push(thumb),
                Ok(false) => {}
                Err(e) => warn!("Failed to remove orphaned thumbnail {}: {}", thumb.display(), e),
            }
        }

        let report = ReconcileReport {
            removed_records,
            removed_thumbnails,
        };
        if report.is_clean() {
            debug!("Reconcile found nothing to prune");
        } else {
            info!(
                "Reconcile pruned {} records and {} thumbnails",
                report.removed_records.len(),
                report.removed_thumbnails.len()
            );
        }
        Ok(report)
    }

    /// Drop in-memory thumbnails and the cached index after a full reload.
    /// Everything is re-read from disk on next access.
    pub fn reload(&self) {
        self.thumbnails.clear_all();
        self.index.invalidate();
    }
}

impl std::fmt::Debug for AssetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetService")
            .field("root", &self.content.root())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

fn filename_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| StoreError::Validation {
            field: "path".to_string(),
            message: format!("{} has no file name", path.display()),
        })
}

async fn remove_if_exists(path: PathBuf) -> Result<bool> {
    tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io_with_path(e, &path)),
    })
    .await?
}

async fn move_if_exists(from: PathBuf, to: PathBuf) -> Result<bool> {
    tokio::task::spawn_blocking(move || match std::fs::rename(&from, &to) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io_with_path(e, &from)),
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, AssetService) {
        let temp_dir = TempDir::new().unwrap();
        let service = AssetService::open(temp_dir.path().join("store"))
            .await
            .unwrap();
        (temp_dir, service)
    }

    fn source(temp_dir: &TempDir, name: &str) -> PathBuf {
        let path = temp_dir.path().join(name);
        std::fs::write(&path, b"usdz-payload").unwrap();
        path
    }

    #[tokio::test]
    async fn test_save_with_metadata() {
        let (temp_dir, service) = setup().await;
        let record = AssetMetadataRecord::new("bedroom").with_tags(["upstairs"]);

        let asset = service
            .save_asset(
                &source(&temp_dir, "scan.usdz"),
                AssetCategory::Room,
                Some("Master Bedroom"),
                Some(record.clone()),
            )
            .await
            .unwrap();

        assert!(asset.filename.starts_with("room_Master_Bedroom_"));
        assert_eq!(service.get_metadata(&asset.path).await, Some(record.clone()));
        assert_eq!(service.get_metadata(&asset.filename).await, Some(record));
    }

    #[tokio::test]
    async fn test_set_metadata_requires_asset() {
        let (_temp_dir, service) = setup().await;
        let missing = service
            .content()
            .folder(AssetCategory::Room)
            .join("ghost.usdz");

        let result = service
            .set_metadata(&missing, AssetMetadataRecord::new("x"))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_rename_collision_changes_nothing() {
        let (temp_dir, service) = setup().await;
        let first = service
            .save_asset(
                &source(&temp_dir, "a.usdz"),
                AssetCategory::Furniture,
                None,
                Some(AssetMetadataRecord::new("table")),
            )
            .await
            .unwrap();
        let second = service
            .save_asset(&source(&temp_dir, "b.usdz"), AssetCategory::Furniture, None, None)
            .await
            .unwrap();

        let stem = second.filename.trim_end_matches(".usdz");
        let result = service.rename_asset(&first.path, stem).await;
        assert!(matches!(result, Err(StoreError::NameCollision { .. })));
        assert!(first.path.exists());
        assert!(service.get_metadata(&first.filename).await.is_some());
        assert!(service.get_metadata(&second.filename).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_outside_store_touches_nothing() {
        let (temp_dir, service) = setup().await;
        let record = AssetMetadataRecord::new("kitchen");
        let stored = service
            .save_asset(
                &source(&temp_dir, "scan.usdz"),
                AssetCategory::Room,
                None,
                Some(record.clone()),
            )
            .await
            .unwrap();

        // Same filename as the stored asset, but outside the store
        let outside = temp_dir.path().join(&stored.filename);
        std::fs::write(&outside, b"not ours").unwrap();

        let result = service.delete_asset(&outside).await;
        assert!(matches!(result, Err(StoreError::Validation { .. })));
        assert!(outside.exists());
        assert_eq!(service.get_metadata(&stored.path).await, Some(record.clone()));

        let result = service.rename_asset(&outside, "Moved").await;
        assert!(matches!(result, Err(StoreError::Validation { .. })));
        assert!(outside.exists());

        let result = service
            .set_metadata(&outside, AssetMetadataRecord::new("other"))
            .await;
        assert!(matches!(result, Err(StoreError::Validation { .. })));
        assert_eq!(service.get_metadata(&stored.path).await, Some(record));
    }

    #[tokio::test]
    async fn test_rename_across_categories_keeps_annotations_apart() {
        let (temp_dir, service) = setup().await;
        let chair = service
            .save_asset(
                &source(&temp_dir, "chair.usdz"),
                AssetCategory::Furniture,
                None,
                Some(AssetMetadataRecord::new("chair")),
            )
            .await
            .unwrap();
        let kitchen = service
            .save_asset(
                &source(&temp_dir, "kitchen.usdz"),
                AssetCategory::Room,
                None,
                Some(AssetMetadataRecord::new("kitchen")),
            )
            .await
            .unwrap();

        let shared = service.rename_asset(&chair.path, "Shared").await.unwrap();
        let result = service.rename_asset(&kitchen.path, "Shared").await;
        assert!(matches!(result, Err(StoreError::NameCollision { .. })));

        assert_eq!(
            service.get_metadata(&shared).await.map(|r| r.category),
            Some("chair".to_string())
        );
        service.delete_asset(&kitchen.path).await.unwrap();
        assert!(shared.exists());
        assert_eq!(
            service.get_metadata(&shared).await.map(|r| r.category),
            Some("chair".to_string())
        );
    }

    #[tokio::test]
    async fn test_rename_drops_stale_thumbnail_of_target() {
        let (temp_dir, service) = setup().await;
        let old = service
            .save_asset(&source(&temp_dir, "a.usdz"), AssetCategory::Furniture, None, None)
            .await
            .unwrap();
        let target = old.path.with_file_name("Stool.usdz");

        // Cache a thumbnail for the target path, then remove that asset
        // behind the service's back
        std::fs::write(&target, b"previous").unwrap();
        image::RgbaImage::new(4, 4)
            .save(thumbnail_path(&target))
            .unwrap();
        assert!(service.thumbnail(&target).await.is_some());
        std::fs::remove_file(&target).unwrap();
        std::fs::remove_file(thumbnail_path(&target)).unwrap();
        assert!(service.thumbnails().peek(&target).is_some());

        let renamed = service.rename_asset(&old.path, "Stool").await.unwrap();
        assert_eq!(renamed, target);
        assert!(service.thumbnails().peek(&renamed).is_none());
    }

    #[tokio::test]
    async fn test_storage_stats_all() {
        let (temp_dir, service) = setup().await;
        service
            .save_asset(&source(&temp_dir, "a.usdz"), AssetCategory::Furniture, None, None)
            .await
            .unwrap();
        service
            .save_asset(&source(&temp_dir, "b.usdz"), AssetCategory::Room, None, None)
            .await
            .unwrap();

        let stats = service.storage_stats_all().await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_bytes, 2 * b"usdz-payload".len() as u64);
    }

    #[tokio::test]
    async fn test_reload_rereads_index() {
        let (temp_dir, service) = setup().await;
        let asset = service
            .save_asset(&source(&temp_dir, "a.usdz"), AssetCategory::Room, None, None)
            .await
            .unwrap();
        assert!(service.index().len().await == 0);
        assert!(service.index().is_loaded());

        service.reload();
        assert!(!service.index().is_loaded());
        assert!(service.get_metadata(&asset.path).await.is_none());
    }
}
