//! # storage-adapters
//!
//! Concrete implementations of the `domains` ports:
//! - [`db::SqliteStore`]: every relational port on one SQLite pool.
//! - [`media::LocalContentStore`]: content-addressed blobs on the local
//!   filesystem, with directory sharding and thumbnailing.

pub mod db;
pub mod media;

pub use db::SqliteStore;
pub use media::LocalContentStore;
