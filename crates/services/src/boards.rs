//! Board administration.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use domains::{Board, BoardRepository, DomainError, Result, ThreadRepository};

use crate::reaper::OrphanReaper;

pub const DEFAULT_BUMP_LIMIT: u32 = 300;

static BOARD_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]{1,16}$").expect("invalid board id regex"));

#[derive(Clone)]
pub struct BoardService {
    boards: Arc<dyn BoardRepository>,
    threads: Arc<dyn ThreadRepository>,
    reaper: OrphanReaper,
    default_bump_limit: u32,
}

impl BoardService {
    pub fn new(
        boards: Arc<dyn BoardRepository>,
        threads: Arc<dyn ThreadRepository>,
        reaper: OrphanReaper,
    ) -> Self {
        Self {
            boards,
            threads,
            reaper,
            default_bump_limit: DEFAULT_BUMP_LIMIT,
        }
    }

    pub fn with_default_bump_limit(mut self, bump_limit: u32) -> Self {
        self.default_bump_limit = bump_limit;
        self
    }

    /// Boards start with an empty counter; the first post gets ID 1.
    #[tracing::instrument(skip(self))]
    pub async fn create(
        &self,
        id: &str,
        full_name: &str,
        bump_limit: Option<u32>,
    ) -> Result<Board> {
        if !BOARD_ID_RE.is_match(id) {
            return Err(DomainError::validation(format!(
                "board id {id:?} must be 1-16 lowercase letters or digits"
            )));
        }
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(DomainError::validation("board name is required"));
        }

        let board = Board {
            id: id.to_owned(),
            full_name: full_name.to_owned(),
            last_post_id: 0,
            bump_limit: bump_limit.unwrap_or(self.default_bump_limit),
        };
        self.boards.create(&board).await?;
        tracing::info!(bump_limit = board.bump_limit, "board created");
        Ok(board)
    }

    pub async fn get(&self, id: &str) -> Result<Board> {
        self.boards
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("board", id))
    }

    pub async fn list(&self) -> Result<Vec<Board>> {
        self.boards.list().await
    }

    pub async fn thread_count(&self, id: &str) -> Result<u64> {
        self.threads.count(id).await
    }

    /// Number of listing pages; an empty board still has one.
    pub async fn page_count(&self, id: &str, page_size: u32) -> Result<u64> {
        if page_size == 0 {
            return Err(DomainError::validation("page size must be positive"));
        }
        let count = self.thread_count(id).await?;
        Ok(count.div_ceil(u64::from(page_size)).max(1))
    }

    /// Cascades every post on the board, then reaps the files it freed.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<u64> {
        let threads = self.boards.delete_cascade(id).await?;
        let reaped = self.reaper.reap().await?;
        tracing::info!(threads, files = reaped.len(), "board deleted");
        Ok(threads)
    }
}
