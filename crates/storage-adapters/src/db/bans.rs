use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{Ban, BanRepository, DomainError, Result};
use sqlx::FromRow;

use super::{db_error, SqliteStore};

#[derive(FromRow)]
struct BanRow {
    ip: String,
    reason: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl TryFrom<BanRow> for Ban {
    type Error = DomainError;

    fn try_from(row: BanRow) -> Result<Self> {
        let ip = row
            .ip
            .parse()
            .map_err(|_| DomainError::Internal(format!("stored ban has bad address {:?}", row.ip)))?;
        Ok(Ban {
            ip,
            reason: row.reason,
            start_date: row.start_date,
            end_date: row.end_date,
        })
    }
}

#[async_trait]
impl BanRepository for SqliteStore {
    async fn upsert(&self, ban: &Ban) -> Result<()> {
        sqlx::query(
            "INSERT INTO bans (ip, reason, start_date, end_date) VALUES (?, ?, ?, ?) \
             ON CONFLICT(ip) DO UPDATE SET reason = excluded.reason, \
             start_date = excluded.start_date, end_date = excluded.end_date",
        )
        .bind(ban.ip.to_string())
        .bind(&ban.reason)
        .bind(ban.start_date)
        .bind(ban.end_date)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get(&self, ip: IpAddr) -> Result<Option<Ban>> {
        let row: Option<BanRow> =
            sqlx::query_as("SELECT ip, reason, start_date, end_date FROM bans WHERE ip = ?")
                .bind(ip.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        row.map(Ban::try_from).transpose()
    }

    async fn delete(&self, ip: IpAddr) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM bans WHERE ip = ?")
            .bind(ip.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_error)?
            .rows_affected();
        Ok(removed > 0)
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<Ban>> {
        let rows: Vec<BanRow> = sqlx::query_as(
            "SELECT ip, reason, start_date, end_date FROM bans \
             ORDER BY start_date DESC LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.into_iter().map(Ban::try_from).collect()
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bans")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let purged = sqlx::query("DELETE FROM bans WHERE end_date <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error)?
            .rows_affected();
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_store;
    use chrono::Duration;

    fn ban(ip: &str, ends_in: Duration) -> Ban {
        let now = Utc::now();
        Ban {
            ip: ip.parse().unwrap(),
            reason: "spam".into(),
            start_date: now,
            end_date: now + ends_in,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_the_existing_ban() {
        let store = memory_store().await;
        store.upsert(&ban("10.0.0.1", Duration::hours(1))).await.unwrap();
        let mut longer = ban("10.0.0.1", Duration::days(7));
        longer.reason = "repeat offender".into();
        store.upsert(&longer).await.unwrap();

        let stored = BanRepository::get(&store, longer.ip).await.unwrap().unwrap();
        assert_eq!(stored.reason, "repeat offender");
        assert_eq!(BanRepository::count(&store).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_drops_only_ended_bans() {
        let store = memory_store().await;
        store.upsert(&ban("10.0.0.1", Duration::hours(-1))).await.unwrap();
        store.upsert(&ban("::1", Duration::hours(1))).await.unwrap();

        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 1);
        let left = BanRepository::list(&store, 10, 0).await.unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].ip.is_ipv6());
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_went() {
        let store = memory_store().await;
        let ip: IpAddr = "10.0.0.2".parse().unwrap();
        store.upsert(&ban("10.0.0.2", Duration::hours(1))).await.unwrap();
        assert!(BanRepository::delete(&store, ip).await.unwrap());
        assert!(!BanRepository::delete(&store, ip).await.unwrap());
    }
}
