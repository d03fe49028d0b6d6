//! Boundary to the external thumbnail renderer.

use crate::error::{Result, StoreError};
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use std::path::Path;
use std::sync::Arc;

/// Turns an asset file into a bitmap.
///
/// Failure is expected (unsupported mesh, renderer busy) and is never fatal:
/// the cache reports "no thumbnail" and the caller shows a placeholder.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn generate(&self, asset_path: &Path, size: u32) -> Result<DynamicImage>;
}

/// Renderer used when none is injected. Always fails, so only thumbnails
/// already persisted on disk are ever served.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

#[async_trait]
impl Renderer for NullRenderer {
    async fn generate(&self, asset_path: &Path, _size: u32) -> Result<DynamicImage> {
        Err(StoreError::Renderer {
            message: format!("No renderer configured for {}", asset_path.display()),
        })
    }
}

/// A decoded thumbnail bitmap. Cheap to clone.
#[derive(Clone)]
pub struct Thumbnail(Arc<RgbaImage>);

impl Thumbnail {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }
}

impl From<DynamicImage> for Thumbnail {
    fn from(image: DynamicImage) -> Self {
        Self::new(image.into_rgba8())
    }
}

impl std::fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Thumbnail({}x{})", self.width(), self.height())
    }
}

impl PartialEq for Thumbnail {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_renderer_fails() {
        let result = NullRenderer.generate(Path::new("/a.usdz"), 64).await;
        assert!(matches!(result, Err(StoreError::Renderer { .. })));
    }

    #[test]
    fn test_thumbnail_from_dynamic_image() {
        let image = DynamicImage::new_rgb8(4, 3);
        let thumbnail = Thumbnail::from(image);
        assert_eq!((thumbnail.width(), thumbnail.height()), (4, 3));
        assert_eq!(format!("{:?}", thumbnail), "Thumbnail(4x3)");
    }
}
