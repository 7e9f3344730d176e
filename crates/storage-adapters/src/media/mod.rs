//! # Media
//!
//! Content-addressed blob storage on the local filesystem.

mod local;
mod thumbnail;

pub use local::{content_key, LocalContentStore};
pub use thumbnail::{derive_thumbnail, THUMBNAIL_DOWNSCALE, THUMBNAIL_WIDTH_THRESHOLD};
