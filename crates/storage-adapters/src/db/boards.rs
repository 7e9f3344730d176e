use async_trait::async_trait;
use domains::{Board, BoardRepository, DomainError, Result};
use sqlx::FromRow;
use tracing::info;

use super::{db_error, to_u32, SqliteStore};

#[derive(FromRow)]
struct BoardRow {
    id: String,
    full_name: String,
    last_post_id: i64,
    bump_limit: i64,
}

impl From<BoardRow> for Board {
    fn from(row: BoardRow) -> Self {
        Board {
            id: row.id,
            full_name: row.full_name,
            last_post_id: row.last_post_id,
            bump_limit: to_u32(row.bump_limit),
        }
    }
}

#[async_trait]
impl BoardRepository for SqliteStore {
    async fn create(&self, board: &Board) -> Result<()> {
        sqlx::query(
            "INSERT INTO boards (id, full_name, last_post_id, bump_limit) VALUES (?, ?, ?, ?)",
        )
        .bind(&board.id)
        .bind(&board.full_name)
        .bind(board.last_post_id)
        .bind(i64::from(board.bump_limit))
        .execute(&self.pool)
        .await
        .map_err(|e| match db_error(e) {
            DomainError::Conflict(_) => {
                DomainError::Conflict(format!("board {} already exists", board.id))
            }
            other => other,
        })?;
        Ok(())
    }

    async fn get(&self, board_id: &str) -> Result<Option<Board>> {
        let row: Option<BoardRow> = sqlx::query_as(
            "SELECT id, full_name, last_post_id, bump_limit FROM boards WHERE id = ?",
        )
        .bind(board_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Board::from))
    }

    async fn list(&self) -> Result<Vec<Board>> {
        let rows: Vec<BoardRow> =
            sqlx::query_as("SELECT id, full_name, last_post_id, bump_limit FROM boards ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(rows.into_iter().map(Board::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_cascade(&self, board_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        for statement in [
            "DELETE FROM post_files WHERE board_id = ?",
            "DELETE FROM citations WHERE board_id = ?",
            "DELETE FROM replies WHERE board_id = ?",
        ] {
            sqlx::query(statement)
                .bind(board_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }
        let threads = sqlx::query("DELETE FROM threads WHERE board_id = ?")
            .bind(board_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();
        let boards = sqlx::query("DELETE FROM boards WHERE id = ?")
            .bind(board_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();
        if boards == 0 {
            return Err(DomainError::not_found("board", board_id));
        }

        tx.commit().await.map_err(db_error)?;
        info!(board = board_id, threads, "board deleted");
        Ok(threads)
    }
}
