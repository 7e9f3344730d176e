//! Reply creation, retrieval and deletion; one level below a thread.

use std::sync::Arc;

use domains::{
    escape_body, parse_ip, DomainError, PostDraft, PostId, PostKind, PostSequencer, Reply, ReplyRepository,
    Result, ThreadRepository, Upload,
};

use crate::hydrate::Hydrator;
use crate::threads::{validate_body, validate_board_id};
use crate::uploads::Uploader;

/// A thread-post submission. Captcha and ban checks happen upstream.
#[derive(Debug, Clone)]
pub struct NewReply {
    pub board_id: String,
    pub thread_id: PostId,
    pub content: String,
    pub poster_ip: String,
    pub uploads: Vec<Upload>,
}

#[derive(Clone)]
pub struct ReplyService {
    threads: Arc<dyn ThreadRepository>,
    replies: Arc<dyn ReplyRepository>,
    sequencer: Arc<dyn PostSequencer>,
    uploader: Uploader,
    hydrator: Hydrator,
}

impl ReplyService {
    pub fn new(
        threads: Arc<dyn ThreadRepository>,
        replies: Arc<dyn ReplyRepository>,
        sequencer: Arc<dyn PostSequencer>,
        uploader: Uploader,
        hydrator: Hydrator,
    ) -> Self {
        Self {
            threads,
            replies,
            sequencer,
            uploader,
            hydrator,
        }
    }

    /// Stores the attachments, then allocates the reply's ID, inserts it and
    /// bumps the parent thread while it is under the board's bump limit.
    #[tracing::instrument(skip_all, fields(board = %input.board_id, thread = input.thread_id))]
    pub async fn create(&self, input: NewReply) -> Result<PostId> {
        validate_board_id(&input.board_id)?;
        let poster_ip = parse_ip(&input.poster_ip)?;
        validate_body(&input.content, &input.uploads)?;

        // Checked up front so a reply to a missing thread stores no blobs. The
        // sequencer re-checks inside its transaction.
        if self
            .threads
            .get(&input.board_id, input.thread_id)
            .await?
            .is_none()
        {
            return Err(DomainError::not_found(
                "thread",
                format!("{}/{}", input.board_id, input.thread_id),
            ));
        }

        let files = self.uploader.store_all(input.uploads).await?;
        let file_count = files.len();

        let id = self
            .sequencer
            .allocate_and_insert(PostDraft {
                board_id: input.board_id.clone(),
                kind: PostKind::Reply {
                    thread_id: input.thread_id,
                },
                content: escape_body(&input.content),
                poster_ip: poster_ip.to_string(),
                files,
            })
            .await?;

        tracing::info!(id, files = file_count, "reply created");
        Ok(id)
    }

    pub async fn get(&self, board_id: &str, id: PostId) -> Result<Reply> {
        let mut reply = self
            .replies
            .get(board_id, id)
            .await?
            .ok_or_else(|| DomainError::not_found("reply", format!("{board_id}/{id}")))?;
        self.hydrator
            .replies(board_id, std::slice::from_mut(&mut reply))
            .await?;
        Ok(reply)
    }

    /// Every reply of the thread, ascending by ID.
    pub async fn list_for_thread(&self, board_id: &str, thread_id: PostId) -> Result<Vec<Reply>> {
        let mut replies = self.replies.for_threads(board_id, &[thread_id]).await?;
        self.hydrator.replies(board_id, &mut replies).await?;
        Ok(replies)
    }

    /// Newest replies across all boards.
    pub async fn recent(&self, limit: u32) -> Result<Vec<Reply>> {
        self.replies.recent(limit).await
    }

    /// Removes the replies with their file links and citations in one
    /// transaction. The parent's post count is left as is.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, board_id: &str, ids: &[PostId]) -> Result<Vec<PostId>> {
        if ids.is_empty() {
            return Err(DomainError::validation("no reply ids given"));
        }
        let removed = self.replies.delete_cascade(board_id, ids).await?;
        tracing::info!(removed = removed.len(), "replies deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrate::fixtures::{reply, thread};
    use bytes::Bytes;
    use domains::{
        MockCitationIndex, MockContentStore, MockFileRepository, MockPostSequencer,
        MockReplyRepository, MockThreadRepository,
    };
    use std::collections::HashMap;

    fn service(
        threads: MockThreadRepository,
        replies: MockReplyRepository,
        sequencer: MockPostSequencer,
        store: MockContentStore,
    ) -> ReplyService {
        let mut files = MockFileRepository::new();
        files.expect_for_posts().returning(|_, _| Ok(HashMap::new()));
        let mut citations = MockCitationIndex::new();
        citations.expect_citing().returning(|_, _| Ok(HashMap::new()));

        let files: Arc<dyn domains::FileRepository> = Arc::new(files);
        ReplyService::new(
            Arc::new(threads),
            Arc::new(replies),
            Arc::new(sequencer),
            Uploader::new(Arc::new(store), files.clone(), 1024),
            Hydrator::new(files, Arc::new(citations)),
        )
    }

    fn new_reply(thread_id: PostId) -> NewReply {
        NewReply {
            board_id: "b".into(),
            thread_id,
            content: ">>1 <b>agreed".into(),
            poster_ip: "2001:db8::1".into(),
            uploads: vec![],
        }
    }

    #[tokio::test]
    async fn create_tags_the_draft_with_its_thread() {
        let mut threads = MockThreadRepository::new();
        threads
            .expect_get()
            .returning(|board, id| Ok(Some(thread(board, id))));
        let mut sequencer = MockPostSequencer::new();
        sequencer
            .expect_allocate_and_insert()
            .withf(|draft| {
                draft.kind == PostKind::Reply { thread_id: 1 }
                    && draft.poster_ip == "2001:db8::1"
                    && draft.content == "&gt;&gt;1 &lt;b&gt;agreed"
            })
            .times(1)
            .returning(|_| Ok(2));

        let svc = service(
            threads,
            MockReplyRepository::new(),
            sequencer,
            MockContentStore::new(),
        );
        assert_eq!(svc.create(new_reply(1)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reply_to_missing_thread_stores_nothing() {
        let mut threads = MockThreadRepository::new();
        threads.expect_get().returning(|_, _| Ok(None));
        let mut sequencer = MockPostSequencer::new();
        sequencer.expect_allocate_and_insert().never();
        let mut store = MockContentStore::new();
        store.expect_put().never();

        let mut input = new_reply(404);
        input.uploads.push(Upload {
            file_name: "x.bin".into(),
            data: Bytes::from_static(b"x"),
        });
        let err = service(threads, MockReplyRepository::new(), sequencer, store)
            .create(input)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn get_hydrates_a_single_reply() {
        let mut replies = MockReplyRepository::new();
        replies
            .expect_get()
            .returning(|board, id| Ok(Some(reply(board, id, 1))));

        let svc = service(
            MockThreadRepository::new(),
            replies,
            MockPostSequencer::new(),
            MockContentStore::new(),
        );
        let found = svc.get("b", 5).await.unwrap();
        assert_eq!(found.thread_id, 1);
        assert_eq!(found.post.id, 5);
    }

    #[tokio::test]
    async fn get_missing_reply_is_not_found() {
        let mut replies = MockReplyRepository::new();
        replies.expect_get().returning(|_, _| Ok(None));

        let svc = service(
            MockThreadRepository::new(),
            replies,
            MockPostSequencer::new(),
            MockContentStore::new(),
        );
        assert!(svc.get("b", 5).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_requires_ids() {
        let mut replies = MockReplyRepository::new();
        replies.expect_delete_cascade().never();
        let svc = service(
            MockThreadRepository::new(),
            replies,
            MockPostSequencer::new(),
            MockContentStore::new(),
        );
        assert!(matches!(
            svc.delete("b", &[]).await,
            Err(DomainError::ValidationError(_))
        ));
    }
}
