//! Wires the services to the SQLite and local-filesystem adapters.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use configs::Settings;
use domains::{
    BanRepository, BoardRepository, CitationIndex, ContentStore, FileRepository, PostSequencer,
    ReplyRepository, ThreadRepository,
};
use services::{
    BanService, BoardService, Hydrator, OrphanReaper, PostLookup, ReplyService, ThreadService,
    Uploader,
};
use storage_adapters::{LocalContentStore, SqliteStore};
use tracing::info;

pub struct App {
    pub settings: Settings,
    pub store: Arc<dyn ContentStore>,
    pub boards: BoardService,
    pub threads: ThreadService,
    pub replies: ReplyService,
    pub lookup: PostLookup,
    pub reaper: OrphanReaper,
    pub bans: BanService,
}

impl App {
    /// Opens the database (applying migrations) and the content store.
    pub async fn build(settings: Settings) -> anyhow::Result<Self> {
        let db = SqliteStore::connect(
            &settings.database.url,
            settings.database.max_connections,
            Duration::from_secs(settings.database.busy_timeout_secs),
        )
        .await
        .with_context(|| format!("opening database {}", settings.database.url))?;
        db.migrate().await.context("applying migrations")?;

        let media = LocalContentStore::open(&settings.media.root)
            .await
            .with_context(|| format!("opening content store {}", settings.media.root.display()))?;
        info!(root = %settings.media.root.display(), "content store ready");

        let db = Arc::new(db);
        let store: Arc<dyn ContentStore> = Arc::new(media);
        let boards_repo: Arc<dyn BoardRepository> = db.clone();
        let threads_repo: Arc<dyn ThreadRepository> = db.clone();
        let replies_repo: Arc<dyn ReplyRepository> = db.clone();
        let files_repo: Arc<dyn FileRepository> = db.clone();
        let citations: Arc<dyn CitationIndex> = db.clone();
        let sequencer: Arc<dyn PostSequencer> = db.clone();
        let bans_repo: Arc<dyn BanRepository> = db;

        let uploader = Uploader::new(
            store.clone(),
            files_repo.clone(),
            settings.media.max_upload_bytes,
        );
        let hydrator = Hydrator::new(files_repo.clone(), citations);
        let reaper = OrphanReaper::new(files_repo, store.clone());

        let threads = ThreadService::new(
            threads_repo.clone(),
            replies_repo.clone(),
            sequencer.clone(),
            uploader.clone(),
            hydrator.clone(),
        )
        .with_preview_replies(settings.board.preview_replies);
        let replies = ReplyService::new(
            threads_repo.clone(),
            replies_repo,
            sequencer,
            uploader,
            hydrator,
        );
        let boards = BoardService::new(boards_repo, threads_repo, reaper.clone())
            .with_default_bump_limit(settings.board.default_bump_limit);
        let lookup = PostLookup::new(threads.clone(), replies.clone(), reaper.clone());
        let bans = BanService::new(bans_repo);

        Ok(Self {
            settings,
            store,
            boards,
            threads,
            replies,
            lookup,
            reaper,
            bans,
        })
    }
}
