//! Local filesystem implementation of `ContentStore`.
//! Features: content-addressable storage, directory sharding and thumbnailing.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use domains::{is_image_content_type, ContentStore, DomainError, Result, StoredBlob};
use image::ImageFormat;
use sha1::{Digest, Sha1};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::thumbnail::derive_thumbnail;

const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Lowercase hex SHA-1 of the bytes.
pub fn content_key(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

pub struct LocalContentStore {
    /// Root directory for all blobs (e.g., "./data/files")
    root: PathBuf,
    /// Held while a blob and its thumbnail are written or removed, so a put
    /// racing a delete of the same key never leaves one without the other.
    write_lock: Mutex<()>,
}

impl LocalContentStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generates a sharded path: "<root>/ab/cdef...".
    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(&key[..2]).join(&key[2..])
    }

    fn thumbnail_path(&self, key: &str) -> PathBuf {
        self.root.join(&key[..2]).join(format!("{}.thumb", &key[2..]))
    }

    async fn ensure_shard(dir: &Path) -> Result<()> {
        if !fs::try_exists(dir).await? {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Writes through a sibling temp file so readers never see a partial blob.
    async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp{}-{seq}", std::process::id()));
        fs::write(&tmp, data).await?;
        if let Err(err) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn read(path: &Path, what: &str, key: &str) -> Result<Bytes> {
        match fs::read(path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(DomainError::not_found(what, key)),
            Err(err) => Err(err.into()),
        }
    }

    async fn remove_if_present(path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    let well_formed = key.len() == 40
        && key
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if well_formed {
        Ok(())
    } else {
        Err(DomainError::validation(format!("malformed content key {key:?}")))
    }
}

/// Image types the thumbnailer cannot read are recorded as opaque bytes, so
/// nothing expects a thumbnail for them.
fn sniff_content_type(data: &[u8]) -> String {
    match infer::get(data).map(|kind| kind.mime_type()) {
        Some(mime) if !is_image_content_type(mime) || thumbnail_format(mime).is_some() => {
            mime.to_owned()
        }
        _ => UNKNOWN_CONTENT_TYPE.to_owned(),
    }
}

fn thumbnail_format(content_type: &str) -> Option<ImageFormat> {
    ImageFormat::from_mime_type(content_type).filter(|format| format.reading_enabled())
}

#[async_trait]
impl ContentStore for LocalContentStore {
    #[tracing::instrument(skip_all, fields(size = data.len()))]
    async fn put(&self, data: Bytes) -> Result<StoredBlob> {
        let key = content_key(&data);
        let content_type = sniff_content_type(&data);
        let blob = StoredBlob {
            key: key.clone(),
            content_type: content_type.clone(),
        };

        let path = self.blob_path(&key);
        if fs::try_exists(&path).await? {
            debug!(%key, "blob already stored");
            return Ok(blob);
        }

        let thumbnail = if thumbnail_format(&content_type).is_some() {
            let source = data.clone();
            let thumb = tokio::task::spawn_blocking(move || derive_thumbnail(&source))
                .await
                .map_err(|e| DomainError::Internal(format!("thumbnail task failed: {e}")))??;
            Some(thumb)
        } else {
            None
        };

        let _guard = self.write_lock.lock().await;
        if fs::try_exists(&path).await? {
            debug!(%key, "blob stored concurrently");
            return Ok(blob);
        }
        if let Some(shard) = path.parent() {
            Self::ensure_shard(shard).await?;
        }
        if let Some(thumbnail) = thumbnail {
            Self::write_atomic(&self.thumbnail_path(&key), &thumbnail).await?;
        }
        Self::write_atomic(&path, &data).await?;

        info!(%key, %content_type, "blob stored");
        Ok(blob)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        validate_key(key)?;
        Self::read(&self.blob_path(key), "file", key).await
    }

    async fn get_thumbnail(&self, key: &str) -> Result<Bytes> {
        validate_key(key)?;
        Self::read(&self.thumbnail_path(key), "thumbnail", key).await
    }

    #[tracing::instrument(skip_all, fields(count = keys.len()))]
    async fn delete(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            validate_key(key)?;
        }
        let _guard = self.write_lock.lock().await;
        for key in keys {
            let blob = Self::remove_if_present(&self.blob_path(key)).await?;
            Self::remove_if_present(&self.thumbnail_path(key)).await?;
            if !blob {
                warn!(%key, "blob was already gone");
            }
        }
        Ok(())
    }
}
