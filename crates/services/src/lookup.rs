//! Resolution of a bare (board, id) pair to whichever post kind owns it.

use domains::{PostId, PostRef, Result};

use crate::reaper::OrphanReaper;
use crate::replies::ReplyService;
use crate::threads::ThreadService;

#[derive(Clone)]
pub struct PostLookup {
    threads: ThreadService,
    replies: ReplyService,
    reaper: OrphanReaper,
}

impl PostLookup {
    pub fn new(threads: ThreadService, replies: ReplyService, reaper: OrphanReaper) -> Self {
        Self {
            threads,
            replies,
            reaper,
        }
    }

    /// Probes threads first, then replies. Threads come back with all their
    /// replies.
    pub async fn resolve(&self, board_id: &str, id: PostId) -> Result<PostRef> {
        match self.threads.get(board_id, id).await {
            Ok(thread) => return Ok(PostRef::Thread(thread)),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        match self.replies.get(board_id, id).await {
            Ok(reply) => Ok(PostRef::Reply(reply)),
            Err(err) if err.is_not_found() => Ok(PostRef::NotFound),
            Err(err) => Err(err),
        }
    }

    /// Moderator delete of a single post of either kind, followed by one
    /// reaping pass. Returns every post ID removed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_post(&self, board_id: &str, id: PostId) -> Result<Vec<PostId>> {
        let removed = match self.replies.delete(board_id, &[id]).await {
            Ok(removed) => removed,
            Err(err) if err.is_not_found() => self.threads.delete(board_id, &[id]).await?,
            Err(err) => return Err(err),
        };
        self.reaper.reap().await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrate::fixtures::reply;
    use crate::hydrate::Hydrator;
    use crate::uploads::Uploader;
    use domains::{
        DomainError, MockCitationIndex, MockContentStore, MockFileRepository, MockPostSequencer,
        MockReplyRepository, MockThreadRepository,
    };
    use std::collections::HashMap;
    use std::sync::Arc;

    fn lookup(threads: MockThreadRepository, replies: MockReplyRepository) -> PostLookup {
        let mut files = MockFileRepository::new();
        files.expect_for_posts().returning(|_, _| Ok(HashMap::new()));
        files.expect_unreferenced().returning(|| Ok(vec![]));
        let mut citations = MockCitationIndex::new();
        citations.expect_citing().returning(|_, _| Ok(HashMap::new()));

        let files: Arc<dyn domains::FileRepository> = Arc::new(files);
        let store: Arc<dyn domains::ContentStore> = Arc::new(MockContentStore::new());
        let threads: Arc<dyn domains::ThreadRepository> = Arc::new(threads);
        let replies: Arc<dyn domains::ReplyRepository> = Arc::new(replies);
        let sequencer: Arc<dyn domains::PostSequencer> = Arc::new(MockPostSequencer::new());
        let uploader = Uploader::new(store.clone(), files.clone(), 1024);
        let hydrator = Hydrator::new(files.clone(), Arc::new(citations));

        PostLookup::new(
            ThreadService::new(
                threads.clone(),
                replies.clone(),
                sequencer.clone(),
                uploader.clone(),
                hydrator.clone(),
            ),
            ReplyService::new(threads, replies, sequencer, uploader, hydrator),
            OrphanReaper::new(files, store),
        )
    }

    #[tokio::test]
    async fn falls_through_to_replies() {
        let mut threads = MockThreadRepository::new();
        threads.expect_get().returning(|_, _| Ok(None));
        let mut replies = MockReplyRepository::new();
        replies
            .expect_get()
            .returning(|board, id| Ok(Some(reply(board, id, 1))));

        match lookup(threads, replies).resolve("b", 2).await.unwrap() {
            PostRef::Reply(reply) => assert_eq!(reply.thread_id, 1),
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_id_resolves_to_not_found() {
        let mut threads = MockThreadRepository::new();
        threads.expect_get().returning(|_, _| Ok(None));
        let mut replies = MockReplyRepository::new();
        replies.expect_get().returning(|_, _| Ok(None));

        assert_eq!(
            lookup(threads, replies).resolve("b", 2).await.unwrap(),
            PostRef::NotFound
        );
    }

    #[tokio::test]
    async fn store_failures_are_not_swallowed() {
        let mut threads = MockThreadRepository::new();
        threads
            .expect_get()
            .returning(|_, _| Err(DomainError::Internal("database is locked".into())));
        let mut replies = MockReplyRepository::new();
        replies.expect_get().never();

        assert!(matches!(
            lookup(threads, replies).resolve("b", 2).await,
            Err(DomainError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn delete_post_falls_back_to_threads() {
        let mut replies = MockReplyRepository::new();
        replies
            .expect_delete_cascade()
            .returning(|_, ids| Err(DomainError::not_found("reply", ids[0])));
        let mut threads = MockThreadRepository::new();
        threads
            .expect_delete_cascade()
            .times(1)
            .returning(|_, _| Ok(vec![1, 2, 3]));

        let removed = lookup(threads, replies).delete_post("b", 1).await.unwrap();
        assert_eq!(removed, vec![1, 2, 3]);
    }
}
