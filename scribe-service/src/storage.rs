//! Object storage for uploaded documents.
//!
//! Objects are immutable blobs addressed by `(bucket, key)`. Every successful
//! write publishes a storage-write event (see [`notify::EventPublisher`]),
//! which is how the extraction worker learns about new documents.

pub mod fs;
pub mod notify;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ServiceResult, StorageError};

pub use fs::FsObjectStore;
pub use notify::EventPublisher;

/// Longest key accepted by the store
const MAX_KEY_LEN: usize = 1024;

/// Reference to a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutput {
    pub etag: String,
    pub size: u64,
}

/// Object contents with their metadata
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub etag: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object and publish a storage-write event for it
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> ServiceResult<PutObjectOutput>;

    /// Read an object back
    async fn get_object(&self, bucket: &str, key: &str) -> ServiceResult<StoredObject>;
}

/// Check that a bucket name or object key is usable as a single path segment.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0']);

    if invalid {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Entity tag for object contents (SHA-256, hex).
pub fn compute_etag(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Content type for an uploaded file, derived from its extension.
pub fn content_type_for(filename: &str) -> mime::Mime {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => mime::APPLICATION_PDF,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("5d3c2a10_photo.jpg").is_ok());
        assert!(validate_key("with space (1).pdf").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("a/b.pdf").is_err());
        assert!(validate_key("a\\b.pdf").is_err());
        assert!(validate_key("nul\0.pdf").is_err());
        assert!(validate_key(&"x".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_compute_etag() {
        assert_eq!(
            compute_etag(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("scan.PDF").essence_str(), "application/pdf");
        assert_eq!(content_type_for("photo.jpg").essence_str(), "image/jpeg");
        assert_eq!(content_type_for("photo.jpeg").essence_str(), "image/jpeg");
        assert_eq!(content_type_for("chart.png").essence_str(), "image/png");
        assert_eq!(
            content_type_for("README").essence_str(),
            "application/octet-stream"
        );
    }
}
