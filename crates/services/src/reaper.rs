//! Removal of attachments no post refers to any more.

use std::sync::Arc;

use domains::{ContentStore, FileRepository, Result};

#[derive(Clone)]
pub struct OrphanReaper {
    files: Arc<dyn FileRepository>,
    store: Arc<dyn ContentStore>,
}

impl OrphanReaper {
    pub fn new(files: Arc<dyn FileRepository>, store: Arc<dyn ContentStore>) -> Self {
        Self { files, store }
    }

    /// Deletes the blobs of every unreferenced file, then their metadata
    /// rows. Returns the reaped keys; running it again right away finds
    /// nothing.
    ///
    /// Rows are only dropped once every blob delete succeeded, so a failed
    /// pass leaves the keys listed for the next one. Rows that gained a link
    /// in the meantime are kept.
    #[tracing::instrument(skip(self))]
    pub async fn reap(&self) -> Result<Vec<String>> {
        let keys = self.files.unreferenced().await?;
        if keys.is_empty() {
            return Ok(keys);
        }
        self.store.delete(&keys).await?;
        let reaped = self.files.delete_unreferenced(&keys).await?;
        if reaped.len() != keys.len() {
            tracing::warn!(
                listed = keys.len(),
                reaped = reaped.len(),
                "files were relinked while being reaped"
            );
        }
        tracing::info!(count = reaped.len(), "orphaned files reaped");
        Ok(reaped)
    }

    /// Moderator removal of one attachment from every post that carries it.
    /// The now unlinked file is then reaped with any other orphans.
    #[tracing::instrument(skip(self))]
    pub async fn remove_file(&self, key: &str) -> Result<()> {
        self.files.unlink(key).await?;
        self.reap().await?;
        tracing::info!(key, "file removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{DomainError, MockContentStore, MockFileRepository};
    use mockall::Sequence;

    fn keys() -> Vec<String> {
        vec!["aa".repeat(20), "bb".repeat(20)]
    }

    #[tokio::test]
    async fn blobs_go_before_their_rows() {
        let mut seq = Sequence::new();
        let mut files = MockFileRepository::new();
        let mut store = MockContentStore::new();
        files
            .expect_unreferenced()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(keys()));
        store
            .expect_delete()
            .withf(|listed| listed == keys().as_slice())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        files
            .expect_delete_unreferenced()
            .withf(|listed| listed == keys().as_slice())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|listed| Ok(listed.to_vec()));

        let reaped = OrphanReaper::new(Arc::new(files), Arc::new(store))
            .reap()
            .await
            .unwrap();
        assert_eq!(reaped, keys());
    }

    #[tokio::test]
    async fn failed_blob_delete_keeps_the_rows() {
        let mut files = MockFileRepository::new();
        files.expect_unreferenced().returning(|| Ok(keys()));
        files.expect_delete_unreferenced().never();
        let mut store = MockContentStore::new();
        store
            .expect_delete()
            .returning(|_| Err(DomainError::Internal("disk gone".into())));

        let reaper = OrphanReaper::new(Arc::new(files), Arc::new(store));
        assert!(reaper.reap().await.is_err());
    }

    #[tokio::test]
    async fn nothing_to_reap_skips_the_store() {
        let mut files = MockFileRepository::new();
        files.expect_unreferenced().returning(|| Ok(vec![]));
        files.expect_delete_unreferenced().never();
        let mut store = MockContentStore::new();
        store.expect_delete().never();

        let reaper = OrphanReaper::new(Arc::new(files), Arc::new(store));
        assert!(reaper.reap().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_file_is_not_removed_from_disk() {
        let mut files = MockFileRepository::new();
        files
            .expect_unlink()
            .returning(|key| Err(DomainError::not_found("file", key)));
        files.expect_unreferenced().never();
        let mut store = MockContentStore::new();
        store.expect_delete().never();

        let reaper = OrphanReaper::new(Arc::new(files), Arc::new(store));
        assert!(reaper.remove_file("ab").await.unwrap_err().is_not_found());
    }
}
