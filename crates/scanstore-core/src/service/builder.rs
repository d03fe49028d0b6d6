//! Builder for configuring AssetService initialization.

use crate::config::{StoreConfig, ThumbnailConfig};
use crate::content::ContentStore;
use crate::error::{Result, StoreError};
use crate::metadata::MetadataIndex;
use crate::service::AssetService;
use crate::thumbnail::{NullRenderer, Renderer, ThumbnailCache};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Builder for configuring AssetService initialization.
///
/// # Example
///
/// ```rust,ignore
/// use scanstore_core::AssetService;
///
/// let service = AssetService::builder("./scans")
///     .renderer(Arc::new(MyRenderer::new()))
///     .thumbnail_size(512)
///     .build()
///     .await?;
/// ```
pub struct AssetServiceBuilder {
    root: PathBuf,
    renderer: Option<Arc<dyn Renderer>>,
    thumbnail_size: u32,
    thumbnail_capacity: u64,
    reconcile_on_start: bool,
}

impl AssetServiceBuilder {
    /// Create a new builder with the store root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            renderer: None,
            thumbnail_size: ThumbnailConfig::DEFAULT_SIZE,
            thumbnail_capacity: ThumbnailConfig::DEFAULT_MEMORY_CAPACITY,
            reconcile_on_start: true,
        }
    }

    /// Renderer used to generate missing thumbnails.
    ///
    /// Default: [`NullRenderer`] (only thumbnails already on disk are served)
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Pixel size requested from the renderer.
    ///
    /// Default: 256
    pub fn thumbnail_size(mut self, size: u32) -> Self {
        self.thumbnail_size = size;
        self
    }

    /// Maximum number of thumbnails kept in memory.
    ///
    /// Default: 256
    pub fn thumbnail_capacity(mut self, capacity: u64) -> Self {
        self.thumbnail_capacity = capacity;
        self
    }

    /// Prune orphaned metadata and thumbnails once while building.
    ///
    /// Default: `true`
    pub fn reconcile_on_start(mut self, enable: bool) -> Self {
        self.reconcile_on_start = enable;
        self
    }

    /// Build the AssetService instance.
    pub async fn build(self) -> Result<AssetService> {
        if self.thumbnail_size == 0 {
            return Err(StoreError::Validation {
                field: "thumbnail_size".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root).map_err(|e| StoreError::Io {
                message: format!("Failed to create store root: {}", root.display()),
                path: Some(root.clone()),
                source: Some(e),
            })
        })
        .await??;

        let content = ContentStore::new(&self.root);
        let index = MetadataIndex::open(self.root.join(StoreConfig::INDEX_FILENAME))?;
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(NullRenderer) as Arc<dyn Renderer>);
        let thumbnails = Arc::new(ThumbnailCache::with_options(
            renderer,
            self.thumbnail_size,
            self.thumbnail_capacity,
        ));

        let service = AssetService::from_parts(content, index, thumbnails);
        info!("Asset store opened at {}", self.root.display());

        if self.reconcile_on_start {
            if let Err(e) = service.reconcile().await {
                warn!("Startup reconciliation failed: {}", e);
            }
        }

        Ok(service)
    }
}
