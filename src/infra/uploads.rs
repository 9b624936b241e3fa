//! Filesystem-backed storage for uploaded file payloads.
//!
//! Payloads land at `{root}/{user_id}/{user_id}_{unix_seconds}_{uuid}{.ext}`;
//! the path relative to `root` is what gets persisted.

use std::error::Error as StdError;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use futures::{StreamExt, pin_mut};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },
    #[error("uploaded file stream failed")]
    PayloadStream {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("uploaded file size exceeds supported range")]
    SizeOverflow,
}

impl UploadStorageError {
    pub fn stream(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::PayloadStream {
            source: Box::new(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Generated file name, unique per upload.
    pub file_name: String,
    /// Location relative to the storage root.
    pub relative_path: String,
    pub size_bytes: i64,
}

#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
    max_bytes: u64,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf, max_bytes: u64) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, max_bytes })
    }

    /// Stream a payload to disk, enforcing the size limit as bytes arrive.
    ///
    /// Empty payloads are stored as empty files. A partial file is removed
    /// when the stream, a write or the size limit fails.
    pub async fn store_stream<S>(
        &self,
        user_id: i64,
        original_name: &str,
        stream: S,
    ) -> Result<StoredUpload, UploadStorageError>
    where
        S: futures::Stream<Item = Result<Bytes, UploadStorageError>>,
    {
        let file_name = build_file_name(user_id, original_name);
        let relative_path = format!("{user_id}/{file_name}");
        let absolute = self.resolve(&relative_path)?;

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        let written = self.write_payload(&mut file, stream).await;
        drop(file);

        let total_bytes = match written {
            Ok(total_bytes) => total_bytes,
            Err(err) => {
                let _ = fs::remove_file(&absolute).await;
                return Err(err);
            }
        };

        let size_bytes =
            i64::try_from(total_bytes).map_err(|_| UploadStorageError::SizeOverflow)?;

        Ok(StoredUpload {
            file_name,
            relative_path,
            size_bytes,
        })
    }

    async fn write_payload<S>(
        &self,
        file: &mut fs::File,
        stream: S,
    ) -> Result<u64, UploadStorageError>
    where
        S: futures::Stream<Item = Result<Bytes, UploadStorageError>>,
    {
        let mut total_bytes: u64 = 0;

        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            total_bytes = total_bytes
                .checked_add(chunk.len() as u64)
                .ok_or(UploadStorageError::SizeOverflow)?;
            if total_bytes > self.max_bytes {
                return Err(UploadStorageError::PayloadTooLarge {
                    limit: self.max_bytes,
                });
            }
            if !chunk.is_empty() {
                file.write_all(&chunk).await?;
            }
        }

        file.flush().await?;
        Ok(total_bytes)
    }

    /// Remove the stored payload. Missing files are treated as success.
    pub async fn delete(&self, relative_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(relative_path)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }

    /// Total size in bytes of every regular file below the root.
    pub async fn total_size(&self) -> Result<u64, UploadStorageError> {
        let mut pending = vec![self.root.clone()];
        let mut total = 0u64;

        while let Some(directory) = pending.pop() {
            let mut entries = fs::read_dir(&directory).await?;
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(entry.path());
                } else if metadata.is_file() {
                    total = total.saturating_add(metadata.len());
                }
            }
        }

        Ok(total)
    }

    fn resolve(&self, relative_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(relative_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

fn build_file_name(user_id: i64, original_name: &str) -> String {
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    let identifier = Uuid::new_v4().simple();
    match sanitized_extension(original_name) {
        Some(ext) => format!("{user_id}_{timestamp}_{identifier}.{ext}"),
        None => format!("{user_id}_{timestamp}_{identifier}"),
    }
}

fn sanitized_extension(original: &str) -> Option<String> {
    Path::new(original)
        .extension()
        .and_then(|value| value.to_str())
        .map(slugify)
        .map(|value| value.replace('-', ""))
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    impl UploadStorage {
        async fn store(
            &self,
            user_id: i64,
            original_name: &str,
            data: Bytes,
        ) -> Result<StoredUpload, UploadStorageError> {
            let stream = stream::once(async move { Ok::<_, UploadStorageError>(data) });
            self.store_stream(user_id, original_name, stream).await
        }

        async fn read(&self, relative_path: &str) -> Bytes {
            let absolute = self.resolve(relative_path).unwrap();
            Bytes::from(fs::read(absolute).await.unwrap())
        }
    }

    fn storage(dir: &tempfile::TempDir, max_bytes: u64) -> UploadStorage {
        UploadStorage::new(dir.path().join("uploads"), max_bytes).unwrap()
    }

    #[tokio::test]
    async fn stores_under_user_directory_with_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024);

        let stored = storage
            .store(7, "Holiday Photo.JPG", Bytes::from_static(b"jpegdata"))
            .await
            .unwrap();

        assert!(stored.file_name.starts_with("7_"));
        assert!(stored.file_name.ends_with(".jpg"));
        assert_eq!(stored.relative_path, format!("7/{}", stored.file_name));
        assert_eq!(stored.size_bytes, 8);
        assert_eq!(
            storage.read(&stored.relative_path).await,
            Bytes::from_static(b"jpegdata")
        );
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 4);

        let err = storage
            .store(1, "big.txt", Bytes::from_static(b"too large"))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadStorageError::PayloadTooLarge { limit: 4 }));
        assert_eq!(storage.total_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_payload_is_stored_as_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024);
        let stored = storage.store(1, "empty.txt", Bytes::new()).await.unwrap();

        assert_eq!(stored.size_bytes, 0);
        assert!(storage.read(&stored.relative_path).await.is_empty());
    }

    #[tokio::test]
    async fn failed_stream_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024);
        let chunks = stream::iter([
            Ok(Bytes::from_static(b"partial")),
            Err(UploadStorageError::stream(std::io::Error::other("client went away"))),
        ]);

        let err = storage.store_stream(3, "cut.txt", chunks).await.unwrap_err();

        assert!(matches!(err, UploadStorageError::PayloadStream { .. }));
        let leftovers = std::fs::read_dir(dir.path().join("uploads").join("3"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_refuses_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024);
        let stored = storage
            .store(2, "a.pdf", Bytes::from_static(b"%PDF"))
            .await
            .unwrap();

        storage.delete(&stored.relative_path).await.unwrap();
        storage.delete(&stored.relative_path).await.unwrap();
        assert!(matches!(
            storage.delete("../outside").await,
            Err(UploadStorageError::InvalidPath)
        ));
    }

    #[tokio::test]
    async fn total_size_walks_user_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024);
        storage.store(1, "a.txt", Bytes::from_static(b"12345")).await.unwrap();
        storage.store(2, "b.txt", Bytes::from_static(b"123")).await.unwrap();

        assert_eq!(storage.total_size().await.unwrap(), 8);
    }

    #[test]
    fn extensions_are_sanitized() {
        assert_eq!(sanitized_extension("x.Tar"), Some("tar".to_string()));
        assert_eq!(sanitized_extension("noext"), None);
        assert_eq!(sanitized_extension("weird.$$$"), None);
    }
}
