//! Content store: per-category folders holding the asset blobs.
//!
//! Layout: `{root}/{category_folder}/{filename}`. All filesystem work runs
//! on the blocking pool so interactive callers never stall on disk I/O.

use crate::config::{is_asset_extension, AssetCategory};
use crate::content::naming::{
    asset_filename, next_timestamp_millis, sanitize_base_name, strip_extension,
    thumbnail_owner_stem,
};
use crate::error::{Result, StoreError};
use crate::types::Asset;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Owns the category folders under an application-private root.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding assets of `category` (not created).
    pub fn folder(&self, category: AssetCategory) -> PathBuf {
        self.root.join(category.folder_name())
    }

    /// Category an asset path belongs to, judged by its parent folder.
    pub fn category_of(&self, path: &Path) -> Option<AssetCategory> {
        let parent = path.parent()?;
        AssetCategory::ALL
            .into_iter()
            .find(|category| parent == self.folder(*category))
    }

    /// Like [`category_of`](Self::category_of), but a path outside every
    /// category folder is a `Validation` error.
    pub fn require_category(&self, path: &Path) -> Result<AssetCategory> {
        self.category_of(path).ok_or_else(|| StoreError::Validation {
            field: "path".to_string(),
            message: format!("{} is not inside a category folder", path.display()),
        })
    }

    /// Create the category folder if needed and return its path.
    pub async fn ensure_folder(&self, category: AssetCategory) -> Result<PathBuf> {
        let folder = self.folder(category);
        let target = folder.clone();
        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&target).map_err(|e| StoreError::io_with_path(e, &target))
        })
        .await??;
        Ok(folder)
    }

    /// Copy `source` into the category folder under a fresh unique name.
    ///
    /// The source file is left in place. `desired_name` defaults to the
    /// source's file stem.
    pub async fn save(
        &self,
        source: &Path,
        category: AssetCategory,
        desired_name: Option<&str>,
    ) -> Result<Asset> {
        let Some(ext) = source.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
            return Err(StoreError::Validation {
                field: "source".to_string(),
                message: format!("{} has no file extension", source.display()),
            });
        };
        if !is_asset_extension(&ext) {
            return Err(StoreError::Validation {
                field: "source".to_string(),
                message: format!("Unsupported asset extension '.{}'", ext),
            });
        }

        let base_name = match desired_name {
            Some(name) => strip_extension(name, &ext).to_string(),
            None => source
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
        };

        let folder = self.ensure_folder(category).await?;
        let filename = asset_filename(category, &base_name, next_timestamp_millis(), &ext);
        let destination = folder.join(&filename);
        let source = source.to_path_buf();

        let dest = destination.clone();
        tokio::task::spawn_blocking(move || copy_durably(&source, &dest)).await??;

        info!("Saved {} asset {}", category, filename);
        self.asset_at(&destination, category).await
    }

    /// Stat a stored asset.
    pub async fn asset_at(&self, path: &Path, category: AssetCategory) -> Result<Asset> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || stat_asset(&path, category)).await?
    }

    /// List the assets of one category, sorted case-insensitively by name.
    ///
    /// Every call enumerates the folder afresh. A missing folder is an empty
    /// category.
    pub async fn list_assets(&self, category: AssetCategory) -> Result<Vec<Asset>> {
        let folder = self.folder(category);
        tokio::task::spawn_blocking(move || list_folder(&folder, category)).await?
    }

    /// Filenames of every asset under the root, including stray files in
    /// nested folders. This is the listing reconciliation runs against.
    pub async fn list_all_filenames(&self) -> Result<HashSet<String>> {
        let paths = self.scan_asset_paths().await?;
        Ok(paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect())
    }

    /// Recursive listing of every asset path under the root.
    pub async fn scan_asset_paths(&self) -> Result<Vec<PathBuf>> {
        let root = self.root.clone();
        let paths = tokio::task::spawn_blocking(move || {
            walk_files(&root)
                .filter(|p| {
                    p.extension()
                        .map(|e| is_asset_extension(&e.to_string_lossy()))
                        .unwrap_or(false)
                })
                .collect::<Vec<_>>()
        })
        .await?;
        Ok(paths)
    }

    /// Recursive listing of every thumbnail sibling under the root.
    pub async fn scan_thumbnail_paths(&self) -> Result<Vec<PathBuf>> {
        let root = self.root.clone();
        let paths = tokio::task::spawn_blocking(move || {
            walk_files(&root)
                .filter(|p| thumbnail_owner_stem(p).is_some())
                .collect::<Vec<_>>()
        })
        .await?;
        Ok(paths)
    }

    /// Rename an asset within its folder, keeping its extension.
    ///
    /// Fails with `Validation` if `old_path` is not a stored asset path,
    /// `NotFound` if it is missing and `NameCollision` if the new filename is
    /// taken in any category folder (metadata is keyed by filename alone).
    pub async fn rename(&self, old_path: &Path, new_name: &str) -> Result<PathBuf> {
        let category = self.require_category(old_path)?;
        let ext = old_path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let base = sanitize_base_name(strip_extension(new_name, &ext));
        let new_filename = if ext.is_empty() {
            base
        } else {
            format!("{}.{}", base, ext)
        };
        let new_path = old_path.with_file_name(&new_filename);
        let elsewhere: Vec<PathBuf> = AssetCategory::ALL
            .into_iter()
            .filter(|other| *other != category)
            .map(|other| self.folder(other).join(&new_filename))
            .collect();
        let old_path = old_path.to_path_buf();

        let moved = new_path.clone();
        tokio::task::spawn_blocking(move || move_no_clobber(&old_path, &moved, &elsewhere))
            .await??;

        Ok(new_path)
    }

    /// Remove an asset blob. Fails with `NotFound` if it is already gone and
    /// with `Validation` if `path` is not a stored asset path.
    pub async fn delete(&self, path: &Path) -> Result<()> {
        self.require_category(path)?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            fs::remove_file(&target).map_err(|e| StoreError::io_with_path(e, &target))
        })
        .await??;
        debug!("Deleted {}", path.display());
        Ok(())
    }
}

/// Copy a file and fsync the result before reporting success.
fn copy_durably(source: &Path, destination: &Path) -> Result<()> {
    if !source.is_file() {
        return Err(StoreError::NotFound {
            path: source.to_path_buf(),
        });
    }

    if destination.exists() {
        warn!(
            "Replacing existing file at {} before save",
            destination.display()
        );
        fs::remove_file(destination).map_err(|e| StoreError::io_with_path(e, destination))?;
    }

    fs::copy(source, destination).map_err(|e| StoreError::Io {
        message: format!(
            "Failed to copy {} to {}",
            source.display(),
            destination.display()
        ),
        path: Some(destination.to_path_buf()),
        source: Some(e),
    })?;

    let file = fs::File::open(destination).map_err(|e| StoreError::io_with_path(e, destination))?;
    file.sync_all()
        .map_err(|e| StoreError::io_with_path(e, destination))?;
    Ok(())
}

fn move_no_clobber(old_path: &Path, new_path: &Path, elsewhere: &[PathBuf]) -> Result<()> {
    if !old_path.is_file() {
        return Err(StoreError::NotFound {
            path: old_path.to_path_buf(),
        });
    }
    if old_path == new_path {
        return Ok(());
    }
    if let Some(taken) = std::iter::once(new_path)
        .chain(elsewhere.iter().map(PathBuf::as_path))
        .find(|p| p.exists())
    {
        return Err(StoreError::NameCollision {
            path: taken.to_path_buf(),
        });
    }
    fs::rename(old_path, new_path).map_err(|e| StoreError::io_with_path(e, old_path))?;
    debug!("Renamed {} -> {}", old_path.display(), new_path.display());
    Ok(())
}

fn stat_asset(path: &Path, category: AssetCategory) -> Result<Asset> {
    let meta = fs::metadata(path).map_err(|e| StoreError::io_with_path(e, path))?;
    let created_at: DateTime<Utc> = meta
        .created()
        .or_else(|_| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(Asset {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        category,
        size_bytes: meta.len(),
        created_at,
    })
}

fn list_folder(folder: &Path, category: AssetCategory) -> Result<Vec<Asset>> {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io_with_path(e, folder)),
    };

    let mut assets = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        let accepted = path
            .extension()
            .map(|e| is_asset_extension(&e.to_string_lossy()))
            .unwrap_or(false);
        if !is_file || !accepted {
            continue;
        }

        match stat_asset(&path, category) {
            Ok(asset) => assets.push(asset),
            // Raced with a concurrent delete
            Err(StoreError::NotFound { .. }) => continue,
            Err(e) => return Err(e),
        }
    }

    assets.sort_by_cached_key(|a| a.filename.to_lowercase());
    Ok(assets)
}

fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ContentStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::new(temp_dir.path().join("assets"));
        (temp_dir, store)
    }

    fn write_source(temp_dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = temp_dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn test_ensure_folder_is_idempotent() {
        let (_temp_dir, store) = setup();
        let first = store.ensure_folder(AssetCategory::Room).await.unwrap();
        let second = store.ensure_folder(AssetCategory::Room).await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
        assert!(first.ends_with("rooms"));
    }

    #[tokio::test]
    async fn test_save_copies_source() {
        let (temp_dir, store) = setup();
        let source = write_source(&temp_dir, "capture.usdz", b"mesh-bytes");

        let asset = store
            .save(&source, AssetCategory::Furniture, Some("Chair Scan"))
            .await
            .unwrap();

        assert!(source.exists());
        assert!(asset.filename.starts_with("furniture_Chair_Scan_"));
        assert!(asset.filename.ends_with(".usdz"));
        assert_eq!(asset.size_bytes, 10);
        assert_eq!(asset.category, AssetCategory::Furniture);
        assert_eq!(fs::read(&asset.path).unwrap(), b"mesh-bytes");
    }

    #[tokio::test]
    async fn test_save_rejects_unknown_extension() {
        let (temp_dir, store) = setup();
        let source = write_source(&temp_dir, "notes.txt", b"hello");

        let result = store.save(&source, AssetCategory::Room, None).await;
        assert!(matches!(result, Err(StoreError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_save_rejects_missing_extension() {
        let (temp_dir, store) = setup();
        let source = write_source(&temp_dir, "capture", b"mesh");

        let result = store.save(&source, AssetCategory::Room, None).await;
        assert!(matches!(result, Err(StoreError::Validation { .. })));
        assert!(!store.folder(AssetCategory::Room).exists());
    }

    #[tokio::test]
    async fn test_save_missing_source() {
        let (temp_dir, store) = setup();
        let source = temp_dir.path().join("gone.usdz");

        let result = store.save(&source, AssetCategory::Room, None).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let (_temp_dir, store) = setup();
        let folder = store.ensure_folder(AssetCategory::Furniture).await.unwrap();
        fs::write(folder.join("beta.usdz"), b"b").unwrap();
        fs::write(folder.join("Alpha.usdz"), b"a").unwrap();
        fs::write(folder.join("gamma.obj"), b"g").unwrap();
        fs::write(folder.join("Alpha_thumb.png"), b"png").unwrap();
        fs::create_dir(folder.join("nested.usdz")).unwrap();

        let names: Vec<String> = store
            .list_assets(AssetCategory::Furniture)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.filename)
            .collect();
        assert_eq!(names, vec!["Alpha.usdz", "beta.usdz", "gamma.obj"]);
    }

    #[tokio::test]
    async fn test_list_missing_folder_is_empty() {
        let (_temp_dir, store) = setup();
        assert!(store.list_assets(AssetCategory::Room).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_all_filenames_recurses() {
        let (_temp_dir, store) = setup();
        let folder = store.ensure_folder(AssetCategory::Room).await.unwrap();
        fs::create_dir_all(folder.join("stray")).unwrap();
        fs::write(folder.join("top.usdz"), b"t").unwrap();
        fs::write(folder.join("stray").join("deep.usdz"), b"d").unwrap();
        fs::write(folder.join("top_thumb.png"), b"p").unwrap();

        let names = store.list_all_filenames().await.unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("top.usdz"));
        assert!(names.contains("deep.usdz"));

        let thumbs = store.scan_thumbnail_paths().await.unwrap();
        assert_eq!(thumbs, vec![folder.join("top_thumb.png")]);
    }

    #[tokio::test]
    async fn test_rename() {
        let (temp_dir, store) = setup();
        let source = write_source(&temp_dir, "scan.usdz", b"x");
        let asset = store.save(&source, AssetCategory::Furniture, None).await.unwrap();

        let new_path = store.rename(&asset.path, "Armchair").await.unwrap();
        assert!(new_path.ends_with("furniture/Armchair.usdz"));
        assert!(new_path.exists());
        assert!(!asset.path.exists());

        // Extension is not doubled
        let again = store.rename(&new_path, "Lounge Chair.usdz").await.unwrap();
        assert!(again.ends_with("furniture/Lounge_Chair.usdz"));
    }

    #[tokio::test]
    async fn test_rename_errors() {
        let (_temp_dir, store) = setup();
        let folder = store.ensure_folder(AssetCategory::Room).await.unwrap();
        fs::write(folder.join("a.usdz"), b"a").unwrap();
        fs::write(folder.join("b.usdz"), b"b").unwrap();

        let collision = store.rename(&folder.join("a.usdz"), "b").await;
        assert!(matches!(collision, Err(StoreError::NameCollision { .. })));
        assert_eq!(fs::read(folder.join("b.usdz")).unwrap(), b"b");

        let missing = store.rename(&folder.join("zzz.usdz"), "c").await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_rename_collides_across_categories() {
        let (_temp_dir, store) = setup();
        let rooms = store.ensure_folder(AssetCategory::Room).await.unwrap();
        let furniture = store.ensure_folder(AssetCategory::Furniture).await.unwrap();
        fs::write(rooms.join("kitchen.usdz"), b"k").unwrap();
        fs::write(furniture.join("Shared.usdz"), b"s").unwrap();

        let result = store.rename(&rooms.join("kitchen.usdz"), "Shared").await;
        assert!(matches!(result, Err(StoreError::NameCollision { .. })));
        assert!(rooms.join("kitchen.usdz").exists());
        assert!(!rooms.join("Shared.usdz").exists());
    }

    #[tokio::test]
    async fn test_paths_outside_store_rejected() {
        let (temp_dir, store) = setup();
        let outside = write_source(&temp_dir, "users_own_file.usdz", b"keep me");

        let deleted = store.delete(&outside).await;
        assert!(matches!(deleted, Err(StoreError::Validation { .. })));
        let renamed = store.rename(&outside, "Moved").await;
        assert!(matches!(renamed, Err(StoreError::Validation { .. })));

        assert_eq!(fs::read(&outside).unwrap(), b"keep me");
        assert!(!temp_dir.path().join("Moved.usdz").exists());
    }

    #[tokio::test]
    async fn test_delete_twice_reports_not_found() {
        let (_temp_dir, store) = setup();
        let folder = store.ensure_folder(AssetCategory::Room).await.unwrap();
        let path = folder.join("a.usdz");
        fs::write(&path, b"a").unwrap();

        store.delete(&path).await.unwrap();
        let second = store.delete(&path).await;
        assert!(second.unwrap_err().is_benign());
    }

    #[tokio::test]
    async fn test_category_of() {
        let (_temp_dir, store) = setup();
        let path = store.folder(AssetCategory::Room).join("x.usdz");
        assert_eq!(store.category_of(&path), Some(AssetCategory::Room));
        assert_eq!(store.category_of(Path::new("/elsewhere/x.usdz")), None);
    }
}
