//! Thumbnail cache with two tiers: in-memory → disk sibling → renderer.
//!
//! The disk sibling is authoritative for "already generated". The memory
//! tier is only an accelerator and may be cleared at any time.

use crate::config::ThumbnailConfig;
use crate::content::thumbnail_path;
use crate::error::{Result, StoreError};
use crate::thumbnail::renderer::{Renderer, Thumbnail};
use image::ImageFormat;
use mini_moka::sync::Cache;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Per-asset gate so only one request renders a given asset at a time.
type Gate = Arc<tokio::sync::Mutex<()>>;

/// Produces thumbnails at most once per asset until invalidated.
pub struct ThumbnailCache {
    renderer: Arc<dyn Renderer>,
    memory: Cache<PathBuf, Thumbnail>,
    in_flight: Mutex<HashMap<PathBuf, Gate>>,
    size: u32,
}

impl ThumbnailCache {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self::with_options(
            renderer,
            ThumbnailConfig::DEFAULT_SIZE,
            ThumbnailConfig::DEFAULT_MEMORY_CAPACITY,
        )
    }

    pub fn with_options(renderer: Arc<dyn Renderer>, size: u32, capacity: u64) -> Self {
        Self {
            renderer,
            memory: Cache::builder().max_capacity(capacity).build(),
            in_flight: Mutex::new(HashMap::new()),
            size,
        }
    }

    /// Pixel size requested from the renderer.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Memory-only lookup. Never touches disk and never waits.
    pub fn peek(&self, asset_path: &Path) -> Option<Thumbnail> {
        self.memory.get(&asset_path.to_path_buf())
    }

    /// Get the thumbnail for an asset, generating it on a miss.
    ///
    /// Returns `None` if the renderer could not produce one.
    pub async fn get(&self, asset_path: &Path) -> Option<Thumbnail> {
        let key = asset_path.to_path_buf();
        if let Some(hit) = self.memory.get(&key) {
            return Some(hit);
        }

        let gate = self.gate_for(&key);
        let result = {
            let _permit = gate.lock().await;
            self.load_or_render(&key).await
        };
        self.release_gate(&key, &gate);
        result
    }

    /// Start generation in the background without waiting for it.
    ///
    /// The result only lands in the cache; callers observe it by polling
    /// [`peek`](Self::peek) or calling [`get`](Self::get) later.
    pub fn spawn_generate(self: &Arc<Self>, asset_path: &Path) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                "No async runtime, skipping thumbnail for {}",
                asset_path.display()
            );
            return;
        };

        let cache = Arc::clone(self);
        let key = asset_path.to_path_buf();
        handle.spawn(async move {
            cache.get(&key).await;
        });
    }

    /// Drop the memory entry for one asset. The disk sibling is untouched.
    pub fn invalidate(&self, asset_path: &Path) {
        self.memory.invalidate(&asset_path.to_path_buf());
    }

    /// Drop the whole memory tier. Disk siblings are found again on the
    /// next `get`.
    pub fn clear_all(&self) {
        self.memory.invalidate_all();
    }

    async fn load_or_render(&self, key: &Path) -> Option<Thumbnail> {
        // Another request may have finished while we waited on the gate
        if let Some(hit) = self.memory.get(&key.to_path_buf()) {
            return Some(hit);
        }

        let sibling = thumbnail_path(key);
        if let Some(thumbnail) = read_sibling(sibling.clone()).await {
            debug!("Thumbnail disk hit for {}", key.display());
            self.memory.insert(key.to_path_buf(), thumbnail.clone());
            return Some(thumbnail);
        }

        // A queued request may outlive a rename or delete of its asset
        if !asset_exists(key).await {
            debug!("Skipping thumbnail for missing asset {}", key.display());
            return None;
        }

        let image = match self.renderer.generate(key, self.size).await {
            Ok(image) => image,
            Err(e) => {
                warn!("No thumbnail for {}: {}", key.display(), e);
                return None;
            }
        };

        if !asset_exists(key).await {
            debug!("Asset {} disappeared while rendering", key.display());
            return None;
        }

        let thumbnail = Thumbnail::from(image);
        if let Err(e) = write_sibling(sibling.clone(), thumbnail.clone()).await {
            warn!("Failed to persist thumbnail for {}: {}", key.display(), e);
        }

        // A delete may have cleared the sibling and memory entry while we wrote
        if !asset_exists(key).await {
            debug!("Asset {} deleted during thumbnail write", key.display());
            let _ = tokio::fs::remove_file(&sibling).await;
            return None;
        }
        self.memory.insert(key.to_path_buf(), thumbnail.clone());
        debug!("Rendered thumbnail for {}", key.display());
        Some(thumbnail)
    }

    fn gate_for(&self, key: &Path) -> Gate {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(in_flight.entry(key.to_path_buf()).or_default())
    }

    fn release_gate(&self, key: &Path, gate: &Gate) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.get(key).is_some_and(|current| Arc::ptr_eq(current, gate)) {
            in_flight.remove(key);
        }
    }
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

async fn asset_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn read_sibling(path: PathBuf) -> Option<Thumbnail> {
    let decoded = tokio::task::spawn_blocking(move || {
        if !path.is_file() {
            return None;
        }
        match image::open(&path) {
            Ok(image) => Some(Thumbnail::from(image)),
            Err(e) => {
                warn!("Ignoring unreadable thumbnail {}: {}", path.display(), e);
                None
            }
        }
    })
    .await;
    decoded.ok().flatten()
}

/// Write through a temp file so a crash never leaves a torn PNG behind.
async fn write_sibling(path: PathBuf, thumbnail: Thumbnail) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let temp_path = path.with_extension(format!("{}.tmp", ThumbnailConfig::EXTENSION));
        thumbnail
            .image()
            .save_with_format(&temp_path, ImageFormat::Png)?;
        std::fs::rename(&temp_path, &path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            StoreError::io_with_path(e, &path)
        })
    })
    .await?
}
