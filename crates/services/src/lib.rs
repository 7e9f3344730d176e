//! # services
//!
//! Posting and moderation use cases. Everything here talks to storage
//! through the `domains` ports, so the engines are tested against mocks and
//! wired to real adapters by the binary.

pub mod bans;
pub mod boards;
pub mod hydrate;
pub mod lookup;
pub mod reaper;
pub mod replies;
pub mod threads;
pub mod uploads;

pub use bans::BanService;
pub use boards::{BoardService, DEFAULT_BUMP_LIMIT};
pub use hydrate::Hydrator;
pub use lookup::PostLookup;
pub use reaper::OrphanReaper;
pub use replies::{NewReply, ReplyService};
pub use threads::{NewThread, ThreadService, DEFAULT_PREVIEW_REPLIES};
pub use uploads::{Uploader, DEFAULT_MAX_UPLOAD_BYTES};
