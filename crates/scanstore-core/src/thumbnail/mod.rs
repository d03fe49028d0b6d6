//! Thumbnail generation and caching.

mod cache;
mod renderer;

pub use cache::ThumbnailCache;
pub use renderer::{NullRenderer, Renderer, Thumbnail};
