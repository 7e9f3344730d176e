use std::collections::HashMap;

use async_trait::async_trait;
use domains::{DomainError, FileInfo, FileRepository, PostId, Result};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

use super::{db_error, push_id_list, SqliteStore};

#[derive(FromRow)]
struct PostFileRow {
    post_id: PostId,
    file_id: String,
    file_name: String,
    content_type: String,
}

/// Attaches stored files to a post, preserving their order.
pub(crate) async fn link_files(
    conn: &mut SqliteConnection,
    board_id: &str,
    post_id: PostId,
    files: &[FileInfo],
) -> Result<()> {
    if files.is_empty() {
        return Ok(());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(
        "INSERT INTO post_files (board_id, post_id, position, file_id, file_name) ",
    );
    qb.push_values(files.iter().enumerate(), |mut row, (position, file)| {
        row.push_bind(board_id.to_owned())
            .push_bind(post_id)
            .push_bind(position as i64)
            .push_bind(file.id.clone())
            .push_bind(file.file_name.clone());
    });
    qb.build().execute(conn).await.map_err(db_error)?;
    Ok(())
}

#[async_trait]
impl FileRepository for SqliteStore {
    async fn upsert(&self, file: &FileInfo) -> Result<()> {
        sqlx::query(
            "INSERT INTO file_infos (id, file_name, content_type) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&file.id)
        .bind(&file.file_name)
        .bind(&file.content_type)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn for_posts(
        &self,
        board_id: &str,
        post_ids: &[PostId],
    ) -> Result<HashMap<PostId, Vec<FileInfo>>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT pf.post_id, pf.file_id, pf.file_name, fi.content_type \
             FROM post_files pf JOIN file_infos fi ON fi.id = pf.file_id \
             WHERE pf.board_id = ",
        );
        qb.push_bind(board_id.to_owned());
        qb.push(" AND pf.post_id IN ");
        push_id_list(&mut qb, post_ids);
        qb.push(" ORDER BY pf.post_id, pf.position");

        let rows: Vec<PostFileRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let mut by_post: HashMap<PostId, Vec<FileInfo>> = HashMap::new();
        for row in rows {
            by_post.entry(row.post_id).or_default().push(FileInfo {
                id: row.file_id,
                file_name: row.file_name,
                content_type: row.content_type,
            });
        }
        Ok(by_post)
    }

    async fn unreferenced(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT id FROM file_infos \
             WHERE NOT EXISTS (SELECT 1 FROM post_files pf WHERE pf.file_id = file_infos.id) \
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn delete_unreferenced(&self, keys: &[String]) -> Result<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM file_infos WHERE id IN (");
        let mut list = qb.separated(", ");
        for key in keys {
            list.push_bind(key.clone());
        }
        list.push_unseparated(
            ") AND NOT EXISTS (SELECT 1 FROM post_files pf WHERE pf.file_id = file_infos.id) \
             RETURNING id",
        );
        let mut removed: Vec<String> = qb
            .build_query_scalar()
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        removed.sort();
        debug!(count = removed.len(), "unreferenced file rows deleted");
        Ok(removed)
    }

    async fn unlink(&self, key: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let known: Option<String> = sqlx::query_scalar("SELECT id FROM file_infos WHERE id = ?")
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        if known.is_none() {
            return Err(DomainError::not_found("file", key));
        }
        sqlx::query("DELETE FROM post_files WHERE file_id = ?")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }
}
