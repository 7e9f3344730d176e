//! Shared harness for the end-to-end tests: real services over a SQLite
//! file database and a local content store, both in a temp directory.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use domains::{
    BanRepository, BoardRepository, CitationIndex, ContentStore, FileRepository, PostId,
    PostSequencer, ReplyRepository, ThreadRepository, Upload,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use services::{
    BanService, BoardService, Hydrator, NewReply, NewThread, OrphanReaper, PostLookup,
    ReplyService, ThreadService, Uploader,
};
use storage_adapters::{LocalContentStore, SqliteStore};
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub db: Arc<SqliteStore>,
    pub media: Arc<LocalContentStore>,
    pub boards: BoardService,
    pub threads: ThreadService,
    pub replies: ReplyService,
    pub lookup: PostLookup,
    pub reaper: OrphanReaper,
    pub bans: BanService,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("board.db").display());
        let db = SqliteStore::connect(&url, 5, Duration::from_secs(10))
            .await
            .expect("connect");
        db.migrate().await.expect("migrate");
        let media = LocalContentStore::open(dir.path().join("files"))
            .await
            .expect("content store");

        let db = Arc::new(db);
        let media = Arc::new(media);
        let store: Arc<dyn ContentStore> = media.clone();
        let threads_repo: Arc<dyn ThreadRepository> = db.clone();
        let replies_repo: Arc<dyn ReplyRepository> = db.clone();
        let files: Arc<dyn FileRepository> = db.clone();
        let citations: Arc<dyn CitationIndex> = db.clone();
        let sequencer: Arc<dyn PostSequencer> = db.clone();
        let boards_repo: Arc<dyn BoardRepository> = db.clone();
        let bans_repo: Arc<dyn BanRepository> = db.clone();

        let uploader = Uploader::new(store.clone(), files.clone(), 4 * 1024 * 1024);
        let hydrator = Hydrator::new(files.clone(), citations);
        let reaper = OrphanReaper::new(files, store);
        let threads = ThreadService::new(
            threads_repo.clone(),
            replies_repo.clone(),
            sequencer.clone(),
            uploader.clone(),
            hydrator.clone(),
        )
        .with_preview_replies(2);
        let replies = ReplyService::new(
            threads_repo.clone(),
            replies_repo,
            sequencer,
            uploader,
            hydrator,
        );
        let boards = BoardService::new(boards_repo, threads_repo, reaper.clone());
        let lookup = PostLookup::new(threads.clone(), replies.clone(), reaper.clone());

        Self {
            dir,
            db,
            media,
            boards,
            threads,
            replies,
            lookup,
            reaper,
            bans: BanService::new(bans_repo),
        }
    }

    pub async fn with_board(board_id: &str, bump_limit: u32) -> Self {
        let harness = Self::new().await;
        harness
            .boards
            .create(board_id, &format!("/{board_id}/"), Some(bump_limit))
            .await
            .expect("create board");
        harness
    }

    pub async fn thread(&self, board_id: &str, content: &str, uploads: Vec<Upload>) -> PostId {
        self.threads
            .create(NewThread {
                board_id: board_id.into(),
                title: "thread".into(),
                content: content.into(),
                poster_ip: "192.0.2.1".into(),
                uploads,
            })
            .await
            .expect("create thread")
    }

    pub async fn reply(
        &self,
        board_id: &str,
        thread_id: PostId,
        content: &str,
        uploads: Vec<Upload>,
    ) -> PostId {
        self.replies
            .create(NewReply {
                board_id: board_id.into(),
                thread_id,
                content: content.into(),
                poster_ip: "192.0.2.2".into(),
                uploads,
            })
            .await
            .expect("create reply")
    }

    /// Where the content store keeps the blob for `key`.
    pub fn blob_path(&self, key: &str) -> PathBuf {
        self.media.root().join(&key[..2]).join(&key[2..])
    }

    /// Number of blob and thumbnail files currently in the content store.
    pub fn stored_files(&self) -> usize {
        let mut count = 0;
        let Ok(shards) = std::fs::read_dir(self.media.root()) else {
            return 0;
        };
        for shard in shards.flatten() {
            if let Ok(entries) = std::fs::read_dir(shard.path()) {
                count += entries.count();
            }
        }
        count
    }
}

/// A PNG upload with a per-seed colour so different seeds hash differently.
pub fn png_upload(name: &str, width: u32, height: u32, seed: u8) -> Upload {
    let img = RgbImage::from_pixel(width, height, Rgb([seed, 255 - seed, 128]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    Upload {
        file_name: name.into(),
        data: Bytes::from(out.into_inner()),
    }
}

pub fn text_upload(name: &str, body: &str) -> Upload {
    Upload {
        file_name: name.into(),
        data: Bytes::from(body.to_owned()),
    }
}
