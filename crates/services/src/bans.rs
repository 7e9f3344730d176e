//! Address bans. The posting paths never consult these themselves; the
//! caller gates submissions with [`BanService::check`].

use std::sync::Arc;

use chrono::{DateTime, Utc};

use domains::{parse_ip, Ban, BanRepository, DomainError, Result};

#[derive(Clone)]
pub struct BanService {
    bans: Arc<dyn BanRepository>,
}

impl BanService {
    pub fn new(bans: Arc<dyn BanRepository>) -> Self {
        Self { bans }
    }

    /// Bans the address until `end_date`, replacing any earlier ban on it.
    #[tracing::instrument(skip(self, reason))]
    pub async fn ban(&self, ip: &str, reason: &str, end_date: DateTime<Utc>) -> Result<Ban> {
        let ip = parse_ip(ip)?;
        let now = Utc::now();
        if end_date <= now {
            return Err(DomainError::validation("ban must end in the future"));
        }
        let ban = Ban {
            ip,
            reason: reason.trim().to_owned(),
            start_date: now,
            end_date,
        };
        self.bans.upsert(&ban).await?;
        tracing::info!(%end_date, "address banned");
        Ok(ban)
    }

    #[tracing::instrument(skip(self))]
    pub async fn unban(&self, ip: &str) -> Result<()> {
        let addr = parse_ip(ip)?;
        if !self.bans.delete(addr).await? {
            return Err(DomainError::not_found("ban", addr));
        }
        tracing::info!("address unbanned");
        Ok(())
    }

    /// The ban currently in force for the address, if any. Expired bans are
    /// ignored.
    pub async fn check(&self, ip: &str) -> Result<Option<Ban>> {
        let addr = parse_ip(ip)?;
        let now = Utc::now();
        Ok(self
            .bans
            .get(addr)
            .await?
            .filter(|ban| ban.is_active_at(now)))
    }

    pub async fn list(&self, page: u32, page_size: u32) -> Result<Vec<Ban>> {
        if page_size == 0 {
            return Err(DomainError::validation("page size must be positive"));
        }
        let offset = page
            .checked_mul(page_size)
            .ok_or_else(|| DomainError::validation("page out of range"))?;
        self.bans.list(page_size, offset).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.bans.count().await
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        let purged = self.bans.purge_expired(Utc::now()).await?;
        if purged > 0 {
            tracing::info!(purged, "expired bans purged");
        }
        Ok(purged)
    }
}
