//! # imageboard
//!
//! Command-line front end for the posting engine: boards, threads, replies,
//! attachments and bans against one SQLite database and content store.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use configs::Settings;
use domains::{parse_post_id, PostId, PostRef, Upload};
use serde::Serialize;
use services::{NewReply, NewThread};
use tracing::warn;

mod app;
mod telemetry;

use app::App;

#[derive(Parser, Debug)]
#[command(name = "imageboard", version, about = "Imageboard posting engine")]
struct Cli {
    /// TOML settings file (defaults to $IMAGEBOARD_CONFIG or ./imageboard.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, inspect and delete boards
    #[command(subcommand)]
    Board(BoardCommand),
    /// Start and read threads
    #[command(subcommand)]
    Thread(ThreadCommand),
    /// Reply to threads
    #[command(subcommand)]
    Reply(ReplyCommand),
    /// Resolve or delete a post of either kind by number
    #[command(subcommand)]
    Post(PostCommand),
    /// Read or remove stored attachments
    #[command(subcommand)]
    File(FileCommand),
    /// Delete attachment blobs no post references any more
    Reap,
    /// Manage address bans
    #[command(subcommand)]
    Ban(BanCommand),
}

#[derive(Subcommand, Debug)]
enum BoardCommand {
    Create {
        id: String,
        full_name: String,
        #[arg(long)]
        bump_limit: Option<u32>,
    },
    List,
    /// Board row plus thread and page counts
    Show { id: String },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum ThreadCommand {
    Post {
        board: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        content: String,
        #[command(flatten)]
        poster: PosterArgs,
    },
    /// A thread with every reply, or only the latest few with --preview
    Show {
        board: String,
        id: String,
        #[arg(long)]
        preview: Option<u32>,
    },
    /// One index page, most recently bumped first (pages start at 0)
    List {
        board: String,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// Newest threads across every board
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[derive(Subcommand, Debug)]
enum ReplyCommand {
    Post {
        board: String,
        thread: String,
        #[arg(long)]
        content: String,
        #[command(flatten)]
        poster: PosterArgs,
    },
    List {
        board: String,
        thread: String,
    },
    /// Newest replies across every board
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[derive(Subcommand, Debug)]
enum PostCommand {
    Show { board: String, id: String },
    Delete { board: String, id: String },
}

#[derive(Subcommand, Debug)]
enum FileCommand {
    /// Write a blob to --out, or stdout
    Get {
        key: String,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Write a blob's thumbnail to --out, or stdout
    Thumb {
        key: String,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Unlink a file from every post and delete it
    Remove { key: String },
}

#[derive(Subcommand, Debug)]
enum BanCommand {
    Add {
        ip: String,
        #[arg(long)]
        reason: String,
        /// Ban length in hours
        #[arg(long = "hours", default_value = "24", value_parser = parse_ban_hours)]
        length: Duration,
    },
    Remove { ip: String },
    List {
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    Check { ip: String },
    /// Drop bans that have already ended
    Purge,
}

#[derive(clap::Args, Debug)]
struct PosterArgs {
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,
    /// Attach a file; repeat for several
    #[arg(long = "file")]
    files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct BoardSummary<'a> {
    #[serde(flatten)]
    board: &'a domains::Board,
    threads: u64,
    pages: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_file(path)?,
        None => Settings::load()?,
    };
    telemetry::init(&settings.log)?;

    let app = App::build(settings).await?;
    run(&app, cli.command).await
}

async fn run(app: &App, command: Commands) -> Result<()> {
    let page_size = app.settings.board.page_size;
    match command {
        Commands::Board(cmd) => match cmd {
            BoardCommand::Create {
                id,
                full_name,
                bump_limit,
            } => print_json(&app.boards.create(&id, &full_name, bump_limit).await?),
            BoardCommand::List => print_json(&app.boards.list().await?),
            BoardCommand::Show { id } => {
                let board = app.boards.get(&id).await?;
                print_json(&BoardSummary {
                    board: &board,
                    threads: app.boards.thread_count(&id).await?,
                    pages: app.boards.page_count(&id, page_size).await?,
                })
            }
            BoardCommand::Delete { id } => {
                let threads = app.boards.delete(&id).await?;
                print_json(&serde_json::json!({ "board": id, "threads_deleted": threads }))
            }
        },
        Commands::Thread(cmd) => match cmd {
            ThreadCommand::Post {
                board,
                title,
                content,
                poster,
            } => {
                refuse_banned(app, &poster.ip).await?;
                let id = app
                    .threads
                    .create(NewThread {
                        board_id: board,
                        title,
                        content,
                        poster_ip: poster.ip,
                        uploads: read_uploads(&poster.files).await?,
                    })
                    .await?;
                print_json(&serde_json::json!({ "id": id }))
            }
            ThreadCommand::Show { board, id, preview } => {
                let id = parse_post_id(&id)?;
                let thread = match preview {
                    Some(n) => app.threads.get_preview(&board, id, n).await?,
                    None => app.threads.get(&board, id).await?,
                };
                print_json(&thread)
            }
            ThreadCommand::List { board, page } => {
                print_json(&app.threads.latest(&board, page, page_size).await?)
            }
            ThreadCommand::Recent { limit } => print_json(&app.threads.recent(limit).await?),
        },
        Commands::Reply(cmd) => match cmd {
            ReplyCommand::Post {
                board,
                thread,
                content,
                poster,
            } => {
                refuse_banned(app, &poster.ip).await?;
                let id = app
                    .replies
                    .create(NewReply {
                        board_id: board,
                        thread_id: parse_post_id(&thread)?,
                        content,
                        poster_ip: poster.ip,
                        uploads: read_uploads(&poster.files).await?,
                    })
                    .await?;
                print_json(&serde_json::json!({ "id": id }))
            }
            ReplyCommand::List { board, thread } => {
                let thread = parse_post_id(&thread)?;
                print_json(&app.replies.list_for_thread(&board, thread).await?)
            }
            ReplyCommand::Recent { limit } => print_json(&app.replies.recent(limit).await?),
        },
        Commands::Post(cmd) => match cmd {
            PostCommand::Show { board, id } => {
                match app.lookup.resolve(&board, parse_post_id(&id)?).await? {
                    PostRef::Thread(thread) => print_json(&thread),
                    PostRef::Reply(reply) => print_json(&reply),
                    PostRef::NotFound => bail!("no post {id} on /{board}/"),
                }
            }
            PostCommand::Delete { board, id } => {
                let removed: Vec<PostId> =
                    app.lookup.delete_post(&board, parse_post_id(&id)?).await?;
                print_json(&serde_json::json!({ "removed": removed }))
            }
        },
        Commands::File(cmd) => match cmd {
            FileCommand::Get { key, out } => write_blob(app.store.get(&key).await?, out).await,
            FileCommand::Thumb { key, out } => {
                write_blob(app.store.get_thumbnail(&key).await?, out).await
            }
            FileCommand::Remove { key } => {
                app.reaper.remove_file(&key).await?;
                print_json(&serde_json::json!({ "removed": key }))
            }
        },
        Commands::Reap => {
            let keys = app.reaper.reap().await?;
            print_json(&serde_json::json!({ "reaped": keys }))
        }
        Commands::Ban(cmd) => match cmd {
            BanCommand::Add { ip, reason, length } => {
                let end_date = Utc::now()
                    .checked_add_signed(length)
                    .context("ban end date is out of range")?;
                print_json(&app.bans.ban(&ip, &reason, end_date).await?)
            }
            BanCommand::Remove { ip } => {
                app.bans.unban(&ip).await?;
                print_json(&serde_json::json!({ "unbanned": ip }))
            }
            BanCommand::List { page } => {
                let bans = app.bans.list(page, page_size).await?;
                let total = app.bans.count().await?;
                print_json(&serde_json::json!({ "total": total, "bans": bans }))
            }
            BanCommand::Check { ip } => print_json(&app.bans.check(&ip).await?),
            BanCommand::Purge => {
                let purged = app.bans.purge_expired().await?;
                print_json(&serde_json::json!({ "purged": purged }))
            }
        },
    }
}

/// Positive whole hours whose end date is representable.
fn parse_ban_hours(value: &str) -> std::result::Result<Duration, String> {
    let hours: i64 = value
        .parse()
        .map_err(|_| format!("{value:?} is not a whole number of hours"))?;
    if hours < 1 {
        return Err("a ban lasts at least one hour".into());
    }
    Duration::try_hours(hours)
        .filter(|length| Utc::now().checked_add_signed(*length).is_some())
        .ok_or_else(|| format!("{hours} hours is too long a ban"))
}

async fn refuse_banned(app: &App, ip: &str) -> Result<()> {
    if let Some(ban) = app.bans.check(ip).await? {
        warn!(ip, until = %ban.end_date, "banned poster refused");
        bail!("{ip} is banned until {}: {}", ban.end_date, ban.reason);
    }
    Ok(())
}

async fn read_uploads(paths: &[PathBuf]) -> Result<Vec<Upload>> {
    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        uploads.push(Upload {
            file_name,
            data: Bytes::from(data),
        });
    }
    Ok(uploads)
}

async fn write_blob(data: Bytes, out: Option<PathBuf>) -> Result<()> {
    match out {
        Some(path) => tokio::fs::write(&path, &data)
            .await
            .with_context(|| format!("writing {}", path.display())),
        None => {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_hours_must_fit_a_date() {
        assert_eq!(parse_ban_hours("24").unwrap(), Duration::hours(24));
        assert!(parse_ban_hours("0").is_err());
        assert!(parse_ban_hours("soon").is_err());
        assert!(parse_ban_hours(&i64::MAX.to_string()).is_err());
        assert!(parse_ban_hours("2562047788015").is_err());
    }

    #[test]
    fn oversized_ban_is_a_usage_error() {
        let err = Cli::try_parse_from([
            "imageboard",
            "ban",
            "add",
            "192.0.2.1",
            "--reason",
            "spam",
            "--hours",
            "9223372036854775807",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
