use async_trait::async_trait;
use chrono::Utc;
use domains::{extract_citations, DomainError, PostDraft, PostId, PostKind, PostSequencer, Result};
use sqlx::Row;
use tracing::debug;

use super::{citations, db_error, files, SqliteStore};

#[async_trait]
impl PostSequencer for SqliteStore {
    #[tracing::instrument(skip_all, fields(board = %draft.board_id))]
    async fn allocate_and_insert(&self, draft: PostDraft) -> Result<PostId> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Writing first takes the database write lock up front, so two
        // posters can never read the same counter value.
        let counter = sqlx::query(
            "UPDATE boards SET last_post_id = last_post_id + 1 WHERE id = ? \
             RETURNING last_post_id, bump_limit",
        )
        .bind(&draft.board_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| DomainError::not_found("board", &draft.board_id))?;
        let id: PostId = counter.try_get("last_post_id").map_err(db_error)?;
        let bump_limit: i64 = counter.try_get("bump_limit").map_err(db_error)?;

        let now = Utc::now();
        match &draft.kind {
            PostKind::Thread { title } => {
                sqlx::query(
                    "INSERT INTO threads \
                     (board_id, id, created_at, content, title, last_bump, post_count, poster_ip) \
                     VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
                )
                .bind(&draft.board_id)
                .bind(id)
                .bind(now)
                .bind(&draft.content)
                .bind(title)
                .bind(now)
                .bind(&draft.poster_ip)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                debug!(id, "thread inserted");
            }
            PostKind::Reply { thread_id } => {
                // The bump decision reads post_count before the increment.
                let post_count: i64 = sqlx::query_scalar(
                    "UPDATE threads SET \
                     last_bump = CASE WHEN post_count < ? THEN ? ELSE last_bump END, \
                     post_count = post_count + 1 \
                     WHERE board_id = ? AND id = ? \
                     RETURNING post_count",
                )
                .bind(bump_limit)
                .bind(now)
                .bind(&draft.board_id)
                .bind(thread_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?
                .ok_or_else(|| DomainError::not_found("thread", thread_id))?;

                sqlx::query(
                    "INSERT INTO replies (board_id, id, created_at, content, thread_id, poster_ip) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&draft.board_id)
                .bind(id)
                .bind(now)
                .bind(&draft.content)
                .bind(thread_id)
                .bind(&draft.poster_ip)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                debug!(
                    id,
                    thread_id,
                    post_count,
                    bumped = post_count <= bump_limit,
                    "reply inserted"
                );
            }
        }

        files::link_files(&mut tx, &draft.board_id, id, &draft.files).await?;
        citations::insert_citations(
            &mut tx,
            &extract_citations(&draft.board_id, id, &draft.content),
        )
        .await?;

        tx.commit().await.map_err(db_error)?;
        Ok(id)
    }
}
