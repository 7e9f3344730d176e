//! Batch population of the transient post fields.
//!
//! Whatever the page size, attachments and citations are fetched with one
//! query each for the whole set of posts.

use std::collections::HashMap;
use std::sync::Arc;

use domains::{CitationIndex, FileRepository, Post, PostId, Reply, Result, Thread};

#[derive(Clone)]
pub struct Hydrator {
    files: Arc<dyn FileRepository>,
    citations: Arc<dyn CitationIndex>,
}

impl Hydrator {
    pub fn new(files: Arc<dyn FileRepository>, citations: Arc<dyn CitationIndex>) -> Self {
        Self { files, citations }
    }

    /// Fills attachments and back-links on the threads and every reply
    /// already attached to them.
    pub async fn threads(&self, board_id: &str, threads: &mut [Thread]) -> Result<()> {
        let mut posts: Vec<&mut Post> = Vec::new();
        for thread in threads.iter_mut() {
            posts.push(&mut thread.post);
            for reply in thread.replies.iter_mut() {
                posts.push(&mut reply.post);
            }
        }
        self.posts(board_id, posts).await
    }

    pub async fn replies(&self, board_id: &str, replies: &mut [Reply]) -> Result<()> {
        let posts = replies.iter_mut().map(|r| &mut r.post).collect();
        self.posts(board_id, posts).await
    }

    async fn posts(&self, board_id: &str, posts: Vec<&mut Post>) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }
        let ids: Vec<PostId> = posts.iter().map(|p| p.id).collect();

        let mut files = self.files.for_posts(board_id, &ids).await?;
        let mut citations = self.citations.citing(board_id, &ids).await?;

        for post in posts {
            post.files = files.remove(&post.id).unwrap_or_default();
            post.citations = citations.remove(&post.id).unwrap_or_default();
        }
        Ok(())
    }
}

/// Moves each reply under its thread, keeping the ascending ID order the
/// repository returned them in.
pub(crate) fn attach_replies(threads: &mut [Thread], replies: Vec<Reply>) {
    let mut by_thread: HashMap<PostId, Vec<Reply>> = HashMap::new();
    for reply in replies {
        by_thread.entry(reply.thread_id).or_default().push(reply);
    }
    for thread in threads.iter_mut() {
        thread.replies = by_thread.remove(&thread.post.id).unwrap_or_default();
    }
}
