//! imageboard/crates/domains/src/lib.rs
//!
//! The central domain model and port definitions for the imageboard core:
//! boards, the thread/reply post family, attachments, citations and bans.

pub mod citations;
pub mod error;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use citations::{escape_body, extract_citations};
pub use error::*;
pub use models::*;
pub use ports::*;
