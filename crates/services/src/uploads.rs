//! Attachment intake: validation, content-store writes and metadata rows.

use std::path::Path;
use std::sync::Arc;

use domains::{
    is_image_content_type, ContentStore, DomainError, FileInfo, FileRepository, Result, Upload,
};

/// Default upload cap when the caller does not configure one.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ContentStore>,
    files: Arc<dyn FileRepository>,
    max_upload_bytes: u64,
}

impl Uploader {
    pub fn new(
        store: Arc<dyn ContentStore>,
        files: Arc<dyn FileRepository>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            store,
            files,
            max_upload_bytes,
        }
    }

    /// Rejects the whole batch before anything touches the store.
    pub fn validate(&self, uploads: &[Upload]) -> Result<()> {
        for upload in uploads {
            if upload.data.is_empty() {
                return Err(DomainError::validation(format!(
                    "file {:?} is empty",
                    upload.file_name
                )));
            }
            if upload.data.len() as u64 > self.max_upload_bytes {
                return Err(DomainError::validation(format!(
                    "file {:?} exceeds {} bytes",
                    upload.file_name, self.max_upload_bytes
                )));
            }
        }
        Ok(())
    }

    /// Durably stores every upload and records its metadata. Returns the
    /// attachments in upload order, named as this poster named them.
    pub async fn store_all(&self, uploads: Vec<Upload>) -> Result<Vec<FileInfo>> {
        self.validate(&uploads)?;

        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let file_name = sanitize_filename(&upload.file_name);
            let blob = self.store.put(upload.data).await?;
            let content_type = resolve_content_type(&blob.content_type, &file_name);

            let info = FileInfo {
                id: blob.key,
                file_name,
                content_type,
            };
            self.files.upsert(&info).await?;
            tracing::debug!(key = %info.id, content_type = %info.content_type, "attachment stored");
            stored.push(info);
        }
        Ok(stored)
    }
}

/// Sniffed types win; unknown bytes fall back to the filename extension.
/// The extension never makes a file an image: only bytes the store could
/// thumbnail are labelled as one.
fn resolve_content_type(sniffed: &str, file_name: &str) -> String {
    let octet_stream = mime::APPLICATION_OCTET_STREAM.essence_str();
    if sniffed != octet_stream {
        return sniffed.to_owned();
    }
    let guessed = mime_guess::from_path(file_name).first_or_octet_stream();
    if is_image_content_type(guessed.essence_str()) {
        return octet_stream.to_owned();
    }
    guessed.essence_str().to_owned()
}

pub(crate) fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|file| file.to_str())
        .unwrap_or("upload");
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_owned()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use domains::{MockContentStore, MockFileRepository, StoredBlob};

    fn upload(name: &str, data: &'static [u8]) -> Upload {
        Upload {
            file_name: name.into(),
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my cat (1).png"), "my_cat__1_.png");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn octet_stream_falls_back_to_extension() {
        assert_eq!(
            resolve_content_type("application/octet-stream", "notes.txt"),
            "text/plain"
        );
        assert_eq!(resolve_content_type("image/png", "notes.txt"), "image/png");
        assert_eq!(
            resolve_content_type("application/octet-stream", "blob"),
            "application/octet-stream"
        );
    }

    #[test]
    fn extension_alone_never_claims_an_image() {
        assert_eq!(
            resolve_content_type("application/octet-stream", "notes.png"),
            "application/octet-stream"
        );
        assert_eq!(
            resolve_content_type("application/octet-stream", "scan.psd"),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn oversized_batch_never_reaches_the_store() {
        let mut store = MockContentStore::new();
        store.expect_put().never();
        let mut files = MockFileRepository::new();
        files.expect_upsert().never();

        let uploader = Uploader::new(Arc::new(store), Arc::new(files), 4);
        let err = uploader
            .store_all(vec![upload("a.txt", b"ok"), upload("b.txt", b"too large")])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationError(_)));
    }

    #[tokio::test]
    async fn stores_blob_then_metadata() {
        let mut store = MockContentStore::new();
        store.expect_put().times(1).returning(|_| {
            Ok(StoredBlob {
                key: "ab".repeat(20),
                content_type: "application/octet-stream".into(),
            })
        });
        let mut files = MockFileRepository::new();
        files
            .expect_upsert()
            .withf(|f| f.file_name == "readme.txt" && f.content_type == "text/plain")
            .times(1)
            .returning(|_| Ok(()));

        let uploader = Uploader::new(Arc::new(store), Arc::new(files), 1024);
        let stored = uploader
            .store_all(vec![upload("readme.txt", b"hello")])
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "ab".repeat(20));
    }
}
