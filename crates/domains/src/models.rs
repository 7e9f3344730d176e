//! # Domain Models
//!
//! These structs represent the core entities of the imageboard.
//! Threads and replies draw their IDs from one per-board counter, so a
//! post is only unique within its board.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Board-scoped post number shared by threads and replies.
pub type PostId = i64;

/// Represents a single board (e.g., /b/, /g/)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// The URL slug (e.g., "b" for /b/)
    pub id: String,
    pub full_name: String,
    /// Highest post ID handed out on this board; never reused
    pub last_post_id: PostId,
    /// Replies a thread may receive before it stops bumping
    pub bump_limit: u32,
}

/// Fields common to threads and replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub board_id: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
    /// Source address, kept for ban enforcement
    pub poster_ip: String,
    /// Populated by hydration, not stored on the post row
    #[serde(default)]
    pub files: Vec<FileInfo>,
    /// Posts citing this one ("replied to by"), populated by hydration
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// A top-level post owning zero or more replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    #[serde(flatten)]
    pub post: Post,
    pub title: String,
    /// The timestamp used for sorting threads by activity
    pub last_bump: DateTime<Utc>,
    /// Replies received so far
    pub post_count: u32,
    /// Ascending by ID; all of them or only the latest few
    #[serde(default)]
    pub replies: Vec<Reply>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(flatten)]
    pub post: Post,
    pub thread_id: PostId,
}

/// Stored attachment metadata. The ID is the content hash of the blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
}

/// Whether a MIME type names an image, i.e. something a reader would expect
/// a thumbnail for.
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

/// `post_id` on `board_id` quotes `cites` in its body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub board_id: String,
    pub post_id: PostId,
    pub cites: PostId,
}

/// Represents a moderation action against an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    pub ip: IpAddr,
    pub reason: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Ban {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.end_date > now
    }
}

/// Which table a newly allocated ID lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostKind {
    Thread { title: String },
    Reply { thread_id: PostId },
}

/// Everything the sequencer needs to allocate an ID and insert a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub board_id: String,
    pub kind: PostKind,
    pub content: String,
    pub poster_ip: String,
    /// Attachments already durably stored in the content store
    pub files: Vec<FileInfo>,
}

/// Result of resolving a bare (board, id) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostRef {
    Thread(Thread),
    Reply(Reply),
    NotFound,
}

/// An uploaded attachment before it reaches the content store.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: bytes::Bytes,
}

/// A blob written (or found already present) in the content store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    /// Sniffed from the bytes; `application/octet-stream` when unknown
    pub content_type: String,
}

/// Parses a post number taken from a URL or form field.
pub fn parse_post_id(raw: &str) -> Result<PostId> {
    match raw.trim().parse::<PostId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(DomainError::validation(format!("malformed post id {raw:?}"))),
    }
}

/// Parses a poster address; bans are keyed by the canonical form.
pub fn parse_ip(raw: &str) -> Result<IpAddr> {
    raw.trim()
        .parse()
        .map_err(|_| DomainError::validation(format!("malformed address {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_post_id_rejects_garbage() {
        assert_eq!(parse_post_id("42").unwrap(), 42);
        assert_eq!(parse_post_id(" 7 ").unwrap(), 7);
        assert!(parse_post_id("0").is_err());
        assert!(parse_post_id("-3").is_err());
        assert!(parse_post_id("12abc").is_err());
        assert!(matches!(
            parse_post_id(""),
            Err(DomainError::ValidationError(_))
        ));
    }

    #[test]
    fn parse_ip_accepts_both_families() {
        assert!(parse_ip("127.0.0.1").unwrap().is_ipv4());
        assert!(parse_ip("::1").unwrap().is_ipv6());
        assert!(parse_ip("localhost").is_err());
    }

    #[test]
    fn ban_expires_at_end_date() {
        let now = Utc::now();
        let ban = Ban {
            ip: "10.0.0.1".parse().unwrap(),
            reason: "spam".into(),
            start_date: now - chrono::Duration::days(1),
            end_date: now + chrono::Duration::hours(1),
        };
        assert!(ban.is_active_at(now));
        assert!(!ban.is_active_at(now + chrono::Duration::hours(2)));
    }

    #[test]
    fn thread_serializes_post_fields_flat() {
        let now = Utc::now();
        let thread = Thread {
            post: Post {
                id: 1,
                board_id: "b".into(),
                created_at: now,
                content: "hello".into(),
                poster_ip: "127.0.0.1".into(),
                files: vec![],
                citations: vec![],
            },
            title: "first".into(),
            last_bump: now,
            post_count: 0,
            replies: vec![],
        };
        let json = serde_json::to_value(&thread).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["title"], "first");
        assert_eq!(json["board_id"], "b");
    }
}
