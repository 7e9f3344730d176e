use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{DomainError, Post, PostId, Result, Thread, ThreadRepository};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::info;

use super::{db_error, push_id_list, to_u32, unlink_posts, SqliteStore};

const THREAD_COLUMNS: &str =
    "board_id, id, created_at, content, title, last_bump, post_count, poster_ip";

#[derive(FromRow)]
struct ThreadRow {
    board_id: String,
    id: PostId,
    created_at: DateTime<Utc>,
    content: String,
    title: String,
    last_bump: DateTime<Utc>,
    post_count: i64,
    poster_ip: String,
}

impl From<ThreadRow> for Thread {
    fn from(row: ThreadRow) -> Self {
        Thread {
            post: Post {
                id: row.id,
                board_id: row.board_id,
                created_at: row.created_at,
                content: row.content,
                poster_ip: row.poster_ip,
                files: Vec::new(),
                citations: Vec::new(),
            },
            title: row.title,
            last_bump: row.last_bump,
            post_count: to_u32(row.post_count),
            replies: Vec::new(),
        }
    }
}

#[async_trait]
impl ThreadRepository for SqliteStore {
    async fn get(&self, board_id: &str, id: PostId) -> Result<Option<Thread>> {
        let row: Option<ThreadRow> = sqlx::query_as(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads WHERE board_id = ? AND id = ?"
        ))
        .bind(board_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Thread::from))
    }

    async fn latest(&self, board_id: &str, limit: u32, offset: u32) -> Result<Vec<Thread>> {
        let rows: Vec<ThreadRow> = sqlx::query_as(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads WHERE board_id = ? \
             ORDER BY last_bump DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(board_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Thread::from).collect())
    }

    async fn count(&self, board_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM threads WHERE board_id = ?")
            .bind(board_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Thread>> {
        let rows: Vec<ThreadRow> = sqlx::query_as(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Thread::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_cascade(&self, board_id: &str, ids: &[PostId]) -> Result<Vec<PostId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut qb =
            QueryBuilder::<Sqlite>::new("DELETE FROM replies WHERE board_id = ");
        qb.push_bind(board_id.to_owned());
        qb.push(" AND thread_id IN ");
        push_id_list(&mut qb, ids);
        qb.push(" RETURNING id");
        let reply_ids: Vec<PostId> = qb
            .build_query_scalar()
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;

        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM threads WHERE board_id = ");
        qb.push_bind(board_id.to_owned());
        qb.push(" AND id IN ");
        push_id_list(&mut qb, ids);
        qb.push(" RETURNING id");
        let thread_ids: Vec<PostId> = qb
            .build_query_scalar()
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;
        if thread_ids.is_empty() {
            return Err(DomainError::not_found("thread", format!("{ids:?}")));
        }

        let mut removed = thread_ids;
        removed.extend(reply_ids);
        removed.sort_unstable();
        unlink_posts(&mut tx, board_id, &removed).await?;

        tx.commit().await.map_err(db_error)?;
        info!(board = board_id, removed = removed.len(), "threads deleted");
        Ok(removed)
    }
}
