use std::collections::HashMap;

use async_trait::async_trait;
use domains::{Citation, CitationIndex, PostId, Result};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

use super::{db_error, push_id_list, SqliteStore};

#[derive(FromRow)]
struct CitationRow {
    board_id: String,
    post_id: PostId,
    cites: PostId,
}

/// Repeated (post, cites) pairs are ignored.
pub(crate) async fn insert_citations(
    conn: &mut SqliteConnection,
    citations: &[Citation],
) -> Result<()> {
    if citations.is_empty() {
        return Ok(());
    }
    let mut qb =
        QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO citations (board_id, post_id, cites) ");
    qb.push_values(citations, |mut row, citation| {
        row.push_bind(citation.board_id.clone())
            .push_bind(citation.post_id)
            .push_bind(citation.cites);
    });
    qb.build().execute(conn).await.map_err(db_error)?;
    Ok(())
}

#[async_trait]
impl CitationIndex for SqliteStore {
    async fn insert(&self, citations: &[Citation]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        insert_citations(&mut tx, citations).await?;
        tx.commit().await.map_err(db_error)
    }

    async fn citing(
        &self,
        board_id: &str,
        post_ids: &[PostId],
    ) -> Result<HashMap<PostId, Vec<Citation>>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT board_id, post_id, cites FROM citations WHERE board_id = ",
        );
        qb.push_bind(board_id.to_owned());
        qb.push(" AND cites IN ");
        push_id_list(&mut qb, post_ids);
        qb.push(" ORDER BY cites, post_id");

        let rows: Vec<CitationRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let mut by_cited: HashMap<PostId, Vec<Citation>> = HashMap::new();
        for row in rows {
            by_cited.entry(row.cites).or_default().push(Citation {
                board_id: row.board_id,
                post_id: row.post_id,
                cites: row.cites,
            });
        }
        Ok(by_cited)
    }
}
