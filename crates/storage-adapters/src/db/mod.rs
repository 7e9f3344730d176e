//! # SQLite Adapter
//!
//! One [`SqliteStore`] implements every relational port. Each port lives in
//! its own module; multi-table writes run in a single transaction.

use std::str::FromStr;
use std::time::Duration;

use domains::{DomainError, PostId, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;

mod bans;
mod boards;
mod citations;
mod files;
mod replies;
mod sequencer;
mod threads;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url`. File databases run
    /// in WAL mode; `sqlite::memory:` is pinned to a single connection so
    /// every caller sees the same database.
    pub async fn connect(url: &str, max_connections: u32, busy_timeout: Duration) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(db_error)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await
        }
        .map_err(db_error)?;

        info!(url, in_memory, "connected to sqlite");
        Ok(Self { pool })
    }

    /// Applies any pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::Internal(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Maps driver errors onto the domain taxonomy.
pub(crate) fn db_error(err: sqlx::Error) -> DomainError {
    match &err {
        sqlx::Error::RowNotFound => DomainError::NotFound("row".into(), "unknown".into()),
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.is_check_violation() =>
        {
            DomainError::Conflict(db.message().to_owned())
        }
        _ => DomainError::Internal(err.to_string()),
    }
}

/// Appends `(?, ?, ...)` binding every ID.
pub(crate) fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[PostId]) {
    qb.push("(");
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    list.push_unseparated(")");
}

/// Drops the attachment links and outbound citations of deleted posts.
pub(crate) async fn unlink_posts(
    conn: &mut SqliteConnection,
    board_id: &str,
    ids: &[PostId],
) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    for table in ["post_files", "citations"] {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {table} WHERE board_id = "));
        qb.push_bind(board_id.to_owned());
        qb.push(" AND post_id IN ");
        push_id_list(&mut qb, ids);
        qb.build().execute(&mut *conn).await.map_err(db_error)?;
    }
    Ok(())
}

/// Decodes an INTEGER counter column into the domain's unsigned type.
pub(crate) fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
