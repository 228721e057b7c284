//! Filesystem-backed object store.
//!
//! Layout under the root directory:
//! - `buckets/{bucket}/{key}`: object bytes
//! - `metadata/{bucket}/{key}.json`: content type, entity tag, size

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{
    EventPublisher, ObjectRef, ObjectStore, PutObjectOutput, StoredObject, compute_etag,
    validate_key,
};
use crate::error::{ServiceResult, StorageError};
use crate::events::StorageEvent;

const BUCKETS_DIR: &str = "buckets";
const METADATA_DIR: &str = "metadata";

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMetadata {
    content_type: String,
    etag: String,
    size: u64,
    last_modified: DateTime<Utc>,
}

pub struct FsObjectStore {
    root: PathBuf,
    publisher: EventPublisher,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, publisher: EventPublisher) -> Self {
        Self {
            root: root.into(),
            publisher,
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(BUCKETS_DIR).join(bucket).join(key)
    }

    fn metadata_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root
            .join(METADATA_DIR)
            .join(bucket)
            .join(format!("{key}.json"))
    }

    async fn write_file(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| io_error(path, e))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> ServiceResult<PutObjectOutput> {
        validate_key(bucket)?;
        validate_key(key)?;

        let etag = compute_etag(&body);
        let size = body.len() as u64;

        let metadata = ObjectMetadata {
            content_type: content_type.to_string(),
            etag: etag.clone(),
            size,
            last_modified: Utc::now(),
        };
        let metadata_json = serde_json::to_vec(&metadata).map_err(|e| StorageError::Io {
            path: self.metadata_path(bucket, key).display().to_string(),
            source: std::io::Error::other(e),
        })?;

        // Metadata first so a reader that sees the object also sees its content type
        Self::write_file(&self.metadata_path(bucket, key), &metadata_json).await?;
        Self::write_file(&self.object_path(bucket, key), &body).await?;

        info!(bucket = %bucket, key = %key, size, "Object stored");

        let event = StorageEvent::object_created(ObjectRef::new(bucket, key), size, etag.clone());
        self.publisher.publish(&event).await;

        Ok(PutObjectOutput { etag, size })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ServiceResult<StoredObject> {
        validate_key(bucket)?;
        validate_key(key)?;

        let path = self.object_path(bucket, key);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
                .into());
            }
            Err(e) => return Err(io_error(&path, e).into()),
        };

        let metadata_path = self.metadata_path(bucket, key);
        let metadata = match tokio::fs::read(&metadata_path).await {
            Ok(raw) => serde_json::from_slice::<ObjectMetadata>(&raw).ok(),
            Err(e) => {
                debug!(path = %metadata_path.display(), error = %e, "Object metadata unavailable");
                None
            }
        };

        let (content_type, etag) = match metadata {
            Some(m) => (m.content_type, m.etag),
            None => (
                mime::APPLICATION_OCTET_STREAM.to_string(),
                compute_etag(&body),
            ),
        };

        Ok(StoredObject {
            body: Bytes::from(body),
            content_type,
            etag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path(), EventPublisher::new());

        let output = store
            .put_object(
                "documents",
                "k_photo.jpg",
                Bytes::from_static(b"hello world"),
                "image/jpeg",
            )
            .await
            .unwrap();
        assert_eq!(output.size, 11);
        assert_eq!(
            output.etag,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );

        let object = store.get_object("documents", "k_photo.jpg").await.unwrap();
        assert_eq!(&object.body[..], b"hello world");
        assert_eq!(object.content_type, "image/jpeg");
        assert_eq!(object.etag, output.etag);
    }

    #[tokio::test]
    async fn test_put_publishes_event() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let store = FsObjectStore::new(dir.path(), EventPublisher::new().with_channel(tx));

        store
            .put_object("documents", "k_doc.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.object, ObjectRef::new("documents", "k_doc.pdf"));
        assert_eq!(event.size, Some(4));
    }

    #[tokio::test]
    async fn test_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path(), EventPublisher::new());

        let err = store.get_object("documents", "nope.png").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Storage(StorageError::ObjectNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path(), EventPublisher::new());

        let err = store
            .put_object("documents", "../escape.png", Bytes::new(), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Storage(StorageError::InvalidKey { .. })
        ));
    }
}
