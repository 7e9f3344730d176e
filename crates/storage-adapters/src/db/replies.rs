use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{DomainError, Post, PostId, Reply, ReplyRepository, Result};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::info;

use super::{db_error, push_id_list, unlink_posts, SqliteStore};

const REPLY_COLUMNS: &str = "board_id, id, created_at, content, thread_id, poster_ip";

#[derive(FromRow)]
struct ReplyRow {
    board_id: String,
    id: PostId,
    created_at: DateTime<Utc>,
    content: String,
    thread_id: PostId,
    poster_ip: String,
}

impl From<ReplyRow> for Reply {
    fn from(row: ReplyRow) -> Self {
        Reply {
            post: Post {
                id: row.id,
                board_id: row.board_id,
                created_at: row.created_at,
                content: row.content,
                poster_ip: row.poster_ip,
                files: Vec::new(),
                citations: Vec::new(),
            },
            thread_id: row.thread_id,
        }
    }
}

#[async_trait]
impl ReplyRepository for SqliteStore {
    async fn get(&self, board_id: &str, id: PostId) -> Result<Option<Reply>> {
        let row: Option<ReplyRow> = sqlx::query_as(&format!(
            "SELECT {REPLY_COLUMNS} FROM replies WHERE board_id = ? AND id = ?"
        ))
        .bind(board_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Reply::from))
    }

    async fn for_threads(&self, board_id: &str, thread_ids: &[PostId]) -> Result<Vec<Reply>> {
        if thread_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {REPLY_COLUMNS} FROM replies WHERE board_id = "
        ));
        qb.push_bind(board_id.to_owned());
        qb.push(" AND thread_id IN ");
        push_id_list(&mut qb, thread_ids);
        qb.push(" ORDER BY id ASC");

        let rows: Vec<ReplyRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(Reply::from).collect())
    }

    async fn latest_for_threads(
        &self,
        board_id: &str,
        thread_ids: &[PostId],
        per_thread: u32,
    ) -> Result<Vec<Reply>> {
        if thread_ids.is_empty() || per_thread == 0 {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {REPLY_COLUMNS} FROM ( \
               SELECT {REPLY_COLUMNS}, \
                      ROW_NUMBER() OVER (PARTITION BY thread_id ORDER BY id DESC) AS rn \
               FROM replies WHERE board_id = "
        ));
        qb.push_bind(board_id.to_owned());
        qb.push(" AND thread_id IN ");
        push_id_list(&mut qb, thread_ids);
        qb.push(") WHERE rn <= ");
        qb.push_bind(i64::from(per_thread));
        qb.push(" ORDER BY thread_id, id ASC");

        let rows: Vec<ReplyRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(Reply::from).collect())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Reply>> {
        let rows: Vec<ReplyRow> = sqlx::query_as(&format!(
            "SELECT {REPLY_COLUMNS} FROM replies ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Reply::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_cascade(&self, board_id: &str, ids: &[PostId]) -> Result<Vec<PostId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM replies WHERE board_id = ");
        qb.push_bind(board_id.to_owned());
        qb.push(" AND id IN ");
        push_id_list(&mut qb, ids);
        qb.push(" RETURNING id");
        let mut removed: Vec<PostId> = qb
            .build_query_scalar()
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;
        if removed.is_empty() {
            return Err(DomainError::not_found("reply", format!("{ids:?}")));
        }
        removed.sort_unstable();
        unlink_posts(&mut tx, board_id, &removed).await?;

        tx.commit().await.map_err(db_error)?;
        info!(board = board_id, removed = removed.len(), "replies deleted");
        Ok(removed)
    }
}
