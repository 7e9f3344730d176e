//! Thread creation, retrieval and cascading deletion.

use std::sync::Arc;

use domains::{
    escape_body, parse_ip, DomainError, PostDraft, PostId, PostKind, PostSequencer, ReplyRepository, Result,
    Thread, ThreadRepository, Upload,
};

use crate::hydrate::{attach_replies, Hydrator};
use crate::uploads::Uploader;

pub const MAX_TITLE_CHARS: usize = 150;
pub const MAX_CONTENT_CHARS: usize = 8000;

/// Replies shown under each thread on a board page.
pub const DEFAULT_PREVIEW_REPLIES: u32 = 5;

/// A board-post submission. Captcha and ban checks happen upstream.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub board_id: String,
    pub title: String,
    pub content: String,
    pub poster_ip: String,
    pub uploads: Vec<Upload>,
}

#[derive(Clone)]
pub struct ThreadService {
    threads: Arc<dyn ThreadRepository>,
    replies: Arc<dyn ReplyRepository>,
    sequencer: Arc<dyn PostSequencer>,
    uploader: Uploader,
    hydrator: Hydrator,
    preview_replies: u32,
}

impl ThreadService {
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
            preview_replies: DEFAULT_PREVIEW_REPLIES,
        }
    }

    pub fn with_preview_replies(mut self, preview_replies: u32) -> Self {
        self.preview_replies = preview_replies;
        self
    }

    /// Stores the attachments, then allocates the thread's ID and inserts it.
    /// A failed upload means no thread row is ever written.
    #[tracing::instrument(skip_all, fields(board = %input.board_id))]
    pub async fn create(&self, input: NewThread) -> Result<PostId> {
        validate_board_id(&input.board_id)?;
        let poster_ip = parse_ip(&input.poster_ip)?;
        let title = input.title.trim().to_owned();
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(DomainError::validation(format!(
                "title longer than {MAX_TITLE_CHARS} characters"
            )));
        }
        validate_body(&input.content, &input.uploads)?;

        let files = self.uploader.store_all(input.uploads).await?;
        let file_count = files.len();

        let id = self
            .sequencer
            .allocate_and_insert(PostDraft {
                board_id: input.board_id.clone(),
                kind: PostKind::Thread { title },
                content: escape_body(&input.content),
                poster_ip: poster_ip.to_string(),
                files,
            })
            .await?;

        tracing::info!(id, files = file_count, "thread created");
        Ok(id)
    }

    /// The thread with every reply, attachments and back-links populated.
    pub async fn get(&self, board_id: &str, id: PostId) -> Result<Thread> {
        let mut thread = self.find(board_id, id).await?;
        let replies = self.replies.for_threads(board_id, &[id]).await?;
        attach_replies(std::slice::from_mut(&mut thread), replies);
        self.hydrator
            .threads(board_id, std::slice::from_mut(&mut thread))
            .await?;
        Ok(thread)
    }

    /// The thread with only its newest `per_thread` replies.
    pub async fn get_preview(&self, board_id: &str, id: PostId, per_thread: u32) -> Result<Thread> {
        let mut thread = self.find(board_id, id).await?;
        let replies = self
            .replies
            .latest_for_threads(board_id, &[id], per_thread)
            .await?;
        attach_replies(std::slice::from_mut(&mut thread), replies);
        self.hydrator
            .threads(board_id, std::slice::from_mut(&mut thread))
            .await?;
        Ok(thread)
    }

    /// One page of the board listing, most recently bumped first. Pages are
    /// zero-based. Every thread carries its latest replies; the whole page is
    /// hydrated with a fixed number of queries.
    #[tracing::instrument(skip(self))]
    pub async fn latest(&self, board_id: &str, page: u32, page_size: u32) -> Result<Vec<Thread>> {
        if page_size == 0 {
            return Err(DomainError::validation("page size must be positive"));
        }
        let offset = page
            .checked_mul(page_size)
            .ok_or_else(|| DomainError::validation("page out of range"))?;

        let mut threads = self.threads.latest(board_id, page_size, offset).await?;
        if threads.is_empty() {
            return Ok(threads);
        }

        let ids: Vec<PostId> = threads.iter().map(|t| t.post.id).collect();
        let replies = self
            .replies
            .latest_for_threads(board_id, &ids, self.preview_replies)
            .await?;
        attach_replies(&mut threads, replies);
        self.hydrator.threads(board_id, &mut threads).await?;
        Ok(threads)
    }

    /// Newest threads across all boards, without replies.
    pub async fn recent(&self, limit: u32) -> Result<Vec<Thread>> {
        self.threads.recent(limit).await
    }

    pub async fn count(&self, board_id: &str) -> Result<u64> {
        self.threads.count(board_id).await
    }

    /// Removes the threads, their replies, file links and citations in one
    /// transaction. Blobs are left for the orphan reaper.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, board_id: &str, ids: &[PostId]) -> Result<Vec<PostId>> {
        if ids.is_empty() {
            return Err(DomainError::validation("no thread ids given"));
        }
        let removed = self.threads.delete_cascade(board_id, ids).await?;
        tracing::info!(removed = removed.len(), "threads deleted");
        Ok(removed)
    }

    async fn find(&self, board_id: &str, id: PostId) -> Result<Thread> {
        self.threads
            .get(board_id, id)
            .await?
            .ok_or_else(|| DomainError::not_found("thread", format!("{board_id}/{id}")))
    }
}

pub(crate) fn validate_board_id(board_id: &str) -> Result<()> {
    if board_id.trim().is_empty() {
        return Err(DomainError::validation("board id is required"));
    }
    Ok(())
}

pub(crate) fn validate_body(content: &str, uploads: &[Upload]) -> Result<()> {
    if content.trim().is_empty() && uploads.is_empty() {
        return Err(DomainError::validation(
            "a post needs a body or an attachment",
        ));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(DomainError::validation(format!(
            "body longer than {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrate::fixtures::{reply, thread};
    use bytes::Bytes;
    use domains::{
        MockCitationIndex, MockContentStore, MockFileRepository, MockPostSequencer,
        MockReplyRepository, MockThreadRepository, StoredBlob,
    };
    use std::collections::HashMap;

    struct Mocks {
        threads: MockThreadRepository,
        replies: MockReplyRepository,
        sequencer: MockPostSequencer,
        store: MockContentStore,
        files: MockFileRepository,
        citations: MockCitationIndex,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                threads: MockThreadRepository::new(),
                replies: MockReplyRepository::new(),
                sequencer: MockPostSequencer::new(),
                store: MockContentStore::new(),
                files: MockFileRepository::new(),
                citations: MockCitationIndex::new(),
            }
        }

        fn quiet_hydration(&mut self) {
            self.files
                .expect_for_posts()
                .times(1)
                .returning(|_, _| Ok(HashMap::new()));
            self.citations
                .expect_citing()
                .times(1)
                .returning(|_, _| Ok(HashMap::new()));
        }

        fn service(self) -> ThreadService {
            let files: Arc<dyn domains::FileRepository> = Arc::new(self.files);
            let uploader = Uploader::new(Arc::new(self.store), files.clone(), 1024);
            let hydrator = Hydrator::new(files, Arc::new(self.citations));
            ThreadService::new(
                Arc::new(self.threads),
                Arc::new(self.replies),
                Arc::new(self.sequencer),
                uploader,
                hydrator,
            )
        }
    }

    fn new_thread(uploads: Vec<Upload>) -> NewThread {
        NewThread {
            board_id: "b".into(),
            title: "  hello  ".into(),
            content: "first post".into(),
            poster_ip: "192.0.2.7".into(),
            uploads,
        }
    }

    #[tokio::test]
    async fn create_allocates_thread_with_trimmed_title() {
        let mut mocks = Mocks::new();
        mocks
            .sequencer
            .expect_allocate_and_insert()
            .withf(|draft| {
                draft.kind
                    == PostKind::Thread {
                        title: "hello".into(),
                    }
                    && draft.poster_ip == "192.0.2.7"
                    && draft.files.is_empty()
            })
            .times(1)
            .returning(|_| Ok(1));

        let id = mocks.service().create(new_thread(vec![])).await.unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn failed_upload_never_creates_the_thread() {
        let mut mocks = Mocks::new();
        mocks
            .store
            .expect_put()
            .times(1)
            .returning(|_| Err(std::io::Error::other("disk full").into()));
        mocks.sequencer.expect_allocate_and_insert().never();

        let err = mocks
            .service()
            .create(new_thread(vec![Upload {
                file_name: "a.png".into(),
                data: Bytes::from_static(b"png"),
            }]))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)));
    }

    #[tokio::test]
    async fn attachments_reach_the_sequencer() {
        let mut mocks = Mocks::new();
        mocks.store.expect_put().times(1).returning(|_| {
            Ok(StoredBlob {
                key: "0a".repeat(20),
                content_type: "image/png".into(),
            })
        });
        mocks.files.expect_upsert().times(1).returning(|_| Ok(()));
        mocks
            .sequencer
            .expect_allocate_and_insert()
            .withf(|draft| draft.files.len() == 1 && draft.files[0].id == "0a".repeat(20))
            .times(1)
            .returning(|_| Ok(12));

        let id = mocks
            .service()
            .create(new_thread(vec![Upload {
                file_name: "a.png".into(),
                data: Bytes::from_static(b"png"),
            }]))
            .await
            .unwrap();
        assert_eq!(id, 12);
    }

    #[tokio::test]
    async fn rejects_malformed_input_before_any_store_call() {
        let mut mocks = Mocks::new();
        mocks.sequencer.expect_allocate_and_insert().never();
        let service = mocks.service();

        let mut empty = new_thread(vec![]);
        empty.content = "   ".into();
        assert!(matches!(
            service.create(empty).await,
            Err(DomainError::ValidationError(_))
        ));

        let mut bad_ip = new_thread(vec![]);
        bad_ip.poster_ip = "not-an-ip".into();
        assert!(matches!(
            service.create(bad_ip).await,
            Err(DomainError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn get_missing_thread_is_not_found() {
        let mut mocks = Mocks::new();
        mocks.threads.expect_get().returning(|_, _| Ok(None));
        mocks.replies.expect_for_threads().never();

        let err = mocks.service().get("b", 9).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn latest_hydrates_the_page_in_batch() {
        let mut mocks = Mocks::new();
        mocks
            .threads
            .expect_latest()
            .withf(|board, limit, offset| board == "b" && *limit == 10 && *offset == 20)
            .returning(|_, _, _| Ok(vec![thread("b", 7), thread("b", 1)]));
        mocks
            .replies
            .expect_latest_for_threads()
            .withf(|_, ids, per| ids == [7, 1].as_slice() && *per == DEFAULT_PREVIEW_REPLIES)
            .times(1)
            .returning(|_, _, _| Ok(vec![reply("b", 2, 1), reply("b", 8, 7)]));
        mocks.quiet_hydration();

        let threads = mocks.service().latest("b", 2, 10).await.unwrap();
        assert_eq!(threads[0].post.id, 7);
        assert_eq!(threads[0].replies[0].post.id, 8);
        assert_eq!(threads[1].replies[0].post.id, 2);
    }

    #[tokio::test]
    async fn delete_surfaces_not_found() {
        let mut mocks = Mocks::new();
        mocks
            .threads
            .expect_delete_cascade()
            .returning(|_, ids| Err(DomainError::not_found("thread", ids[0])));

        let err = mocks.service().delete("b", &[3]).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
