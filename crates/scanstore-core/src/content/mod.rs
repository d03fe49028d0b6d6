//! Asset blob storage.

pub mod naming;
mod store;

pub use naming::{sanitize_base_name, thumbnail_path};
pub use store::ContentStore;
