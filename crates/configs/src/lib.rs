//! # configs
//!
//! Layered settings: built-in defaults, then an optional TOML file, then
//! `IMAGEBOARD__SECTION__KEY` environment variables (a `.env` file is loaded
//! first when present).

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "IMAGEBOARD";
pub const CONFIG_PATH_VAR: &str = "IMAGEBOARD_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "imageboard.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub media: MediaSettings,
    pub board: BoardSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MediaSettings {
    /// Content store root; blobs are sharded beneath it.
    pub root: PathBuf,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BoardSettings {
    /// Threads per index page.
    pub page_size: u32,
    /// Replies shown under each thread on index pages.
    pub preview_replies: u32,
    /// Bump limit for boards created without an explicit one.
    pub default_bump_limit: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `services=debug,sqlx=warn`.
    pub level: String,
    pub format: LogFormat,
}

impl Settings {
    /// Loads settings from the environment, honouring `IMAGEBOARD_CONFIG`
    /// or `./imageboard.toml` when present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(Some(&path))
    }

    /// Loads a file named on the command line; unlike the default file it
    /// has to exist.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::assemble(Some(path), true)
    }

    /// Like [`Settings::load`] but with an explicit (optional) file. A
    /// missing file is not an error.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::assemble(path, false)
    }

    fn assemble(path: Option<&Path>, required: bool) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?;
        if let Some(path) = path {
            builder =
                builder.add_source(File::from(path).format(FileFormat::Toml).required(required));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        tracing::debug!(?settings, "configuration loaded");
        Ok(settings)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("database.url", "sqlite://imageboard.db")?
            .set_default("database.max_connections", 5)?
            .set_default("database.busy_timeout_secs", 5)?
            .set_default("media.root", "./data/files")?
            .set_default("media.max_upload_bytes", 8 * 1024 * 1024)?
            .set_default("board.page_size", 10)?
            .set_default("board.preview_replies", 5)?
            .set_default("board.default_bump_limit", 300)?
            .set_default("log.level", "info")?
            .set_default("log.format", "text")?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("database.max_connections", u64::from(self.database.max_connections)),
            ("media.max_upload_bytes", self.media.max_upload_bytes),
            ("board.page_size", u64::from(self.board.page_size)),
            ("board.preview_replies", u64::from(self.board.preview_replies)),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "database.url",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}
