//! # Core Traits (Ports)
//!
//! Storage adapters implement these traits; the services only ever talk to
//! the store through them. Every method that touches more than one table is
//! a single transaction on the adapter side.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Ban, Board, Citation, FileInfo, PostDraft, PostId, Reply, StoredBlob, Thread};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Content-addressed blob storage with derived thumbnails.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores the bytes under their content hash. Storing identical bytes
    /// again returns the same key without rewriting anything.
    async fn put(&self, data: Bytes) -> Result<StoredBlob>;
    async fn get(&self, key: &str) -> Result<Bytes>;
    /// Fails with NotFound for blobs that have no thumbnail (non-images).
    async fn get_thumbnail(&self, key: &str) -> Result<Bytes>;
    /// Removes each blob and its thumbnail. Already-absent keys are a no-op.
    async fn delete(&self, keys: &[String]) -> Result<()>;
}

/// Allocates post IDs from a board's shared counter.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PostSequencer: Send + Sync {
    /// In one transaction: advance the board counter, insert the thread or
    /// reply row under the new ID, apply the parent thread's bump/post-count
    /// update for replies, link the attachments and index the body's
    /// citations. Nothing is visible if any step fails.
    async fn allocate_and_insert(&self, draft: PostDraft) -> Result<PostId>;
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait BoardRepository: Send + Sync {
    async fn create(&self, board: &Board) -> Result<()>;
    async fn get(&self, board_id: &str) -> Result<Option<Board>>;
    async fn list(&self) -> Result<Vec<Board>>;
    /// Deletes the board with every thread, reply, file link and citation on
    /// it. Returns the number of threads removed.
    async fn delete_cascade(&self, board_id: &str) -> Result<u64>;
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ThreadRepository: Send + Sync {
    async fn get(&self, board_id: &str, id: PostId) -> Result<Option<Thread>>;
    /// Ordered by `last_bump` descending.
    async fn latest(&self, board_id: &str, limit: u32, offset: u32) -> Result<Vec<Thread>>;
    async fn count(&self, board_id: &str) -> Result<u64>;
    /// Newest threads across every board.
    async fn recent(&self, limit: u32) -> Result<Vec<Thread>>;
    /// Deletes the threads and their replies, file links and citations.
    /// NotFound when none of the IDs matched. Returns every removed post ID.
    async fn delete_cascade(&self, board_id: &str, ids: &[PostId]) -> Result<Vec<PostId>>;
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ReplyRepository: Send + Sync {
    async fn get(&self, board_id: &str, id: PostId) -> Result<Option<Reply>>;
    /// Every reply of every given thread, ascending by ID.
    async fn for_threads(&self, board_id: &str, thread_ids: &[PostId]) -> Result<Vec<Reply>>;
    /// The newest `per_thread` replies of each given thread, ascending by ID.
    async fn latest_for_threads(
        &self,
        board_id: &str,
        thread_ids: &[PostId],
        per_thread: u32,
    ) -> Result<Vec<Reply>>;
    /// Newest replies across every board.
    async fn recent(&self, limit: u32) -> Result<Vec<Reply>>;
    /// Deletes the replies and their file links and citations.
    /// NotFound when none of the IDs matched. Returns the removed IDs.
    async fn delete_cascade(&self, board_id: &str, ids: &[PostId]) -> Result<Vec<PostId>>;
}

/// Attachment metadata and the post <-> file join.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Inserts the metadata row; a row with the same hash is left untouched.
    async fn upsert(&self, file: &FileInfo) -> Result<()>;
    /// Attachments of the given posts in one query, keyed by post.
    async fn for_posts(
        &self,
        board_id: &str,
        post_ids: &[PostId],
    ) -> Result<HashMap<PostId, Vec<FileInfo>>>;
    /// Keys of every metadata row no post links to. Deletes nothing.
    async fn unreferenced(&self) -> Result<Vec<String>>;
    /// Deletes those of `keys` that are still unreferenced, in one
    /// transaction, and returns the keys actually removed.
    async fn delete_unreferenced(&self, keys: &[String]) -> Result<Vec<String>>;
    /// Unlinks the file from every post, leaving its metadata row for the
    /// reaper. NotFound when no such file is recorded.
    async fn unlink(&self, key: &str) -> Result<()>;
}

/// Outbound post references, queried as back-links.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CitationIndex: Send + Sync {
    async fn insert(&self, citations: &[Citation]) -> Result<()>;
    /// Citations whose `cites` is one of `post_ids`, keyed by the cited post.
    async fn citing(
        &self,
        board_id: &str,
        post_ids: &[PostId],
    ) -> Result<HashMap<PostId, Vec<Citation>>>;
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait BanRepository: Send + Sync {
    /// Inserts or replaces the ban for this address.
    async fn upsert(&self, ban: &Ban) -> Result<()>;
    async fn get(&self, ip: IpAddr) -> Result<Option<Ban>>;
    /// Returns whether a ban was removed.
    async fn delete(&self, ip: IpAddr) -> Result<bool>;
    /// Ordered by start date, newest first.
    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<Ban>>;
    async fn count(&self) -> Result<u64>;
    /// Drops bans that ended before `now`; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}
