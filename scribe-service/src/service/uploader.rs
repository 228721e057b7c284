//! Document upload and the bounded wait for its extraction record.

use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::records::ExtractionRecord;
use crate::service::ScribeService;
use crate::storage::content_type_for;

/// What the uploader knows about a stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub document_key: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub etag: String,
}

/// How a record wait ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Found(ExtractionRecord),
    /// Every attempt came back empty; the worker may still be running
    NotFound { attempts: u32 },
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollOutcome::Found(_) => "found",
            PollOutcome::NotFound { .. } => "not_found",
            PollOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

/// Strip any directory components a client put in the filename
fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
}

/// Object key for a new upload: `{uuid v4}_{basename}`
pub fn generate_document_key(filename: &str) -> String {
    format!("{}_{}", Uuid::new_v4(), base_name(filename))
}

impl ScribeService {
    /// Check the file type allow-list and size limits.
    pub fn validate_upload(&self, filename: &str, size: u64) -> ServiceResult<()> {
        let uploader = &self.config.uploader;
        let name = base_name(filename);

        if name.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "filename is required".to_string(),
            });
        }

        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let allowed = uploader
            .allowed_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(&extension));
        if !allowed {
            return Err(ServiceError::UnsupportedFileType {
                filename: name.to_string(),
                allowed: uploader.allowed_extensions.join(", "),
            });
        }

        if size == 0 {
            return Err(ServiceError::InvalidRequest {
                message: "uploaded file is empty".to_string(),
            });
        }
        if size > uploader.max_upload_bytes {
            return Err(ServiceError::FileTooLarge {
                size,
                max: uploader.max_upload_bytes,
            });
        }

        Ok(())
    }

    /// Store an uploaded file under a fresh document key.
    ///
    /// The client's content type wins unless it is missing or generic, in
    /// which case it is derived from the extension.
    pub async fn upload_document(
        &self,
        filename: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> ServiceResult<UploadReceipt> {
        self.validate_upload(filename, body.len() as u64)?;

        let name = base_name(filename).to_string();
        let document_key = generate_document_key(&name);
        let content_type = match content_type.map(str::trim) {
            Some(ct) if !ct.is_empty() && ct != mime::APPLICATION_OCTET_STREAM.essence_str() => {
                ct.to_string()
            }
            _ => content_type_for(&name).to_string(),
        };

        let output = self
            .objects
            .put_object(&self.config.storage.bucket, &document_key, body, &content_type)
            .await?;

        metrics::counter!("scribe_uploads_total").increment(1);
        info!(
            document_key = %document_key,
            content_type = %content_type,
            size = output.size,
            "Document uploaded"
        );

        Ok(UploadReceipt {
            document_key,
            filename: name,
            content_type,
            size: output.size,
            etag: output.etag,
        })
    }

    /// Single record-store lookup
    pub fn lookup_record(&self, document_key: &str) -> ServiceResult<Option<ExtractionRecord>> {
        self.records.get(document_key)
    }

    /// Record for a document, or `DocumentNotFound`
    pub fn get_record(&self, document_key: &str) -> ServiceResult<ExtractionRecord> {
        self.lookup_record(document_key)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_key: document_key.to_string(),
            })
    }

    /// Wait for the extraction record of a document, cancellable through
    /// [`ScribeService::cancel_wait`]. Dropping the future ends the wait too.
    pub async fn wait_for_record(&self, document_key: &str) -> ServiceResult<PollOutcome> {
        let registration = self.register_wait(document_key);
        let result = self
            .poll_for_record(document_key, registration.token())
            .await;
        drop(registration);

        if let Ok(outcome) = &result {
            metrics::counter!("scribe_record_waits_total", "outcome" => outcome.as_str())
                .increment(1);
        }
        result
    }

    /// Poll the record store: each attempt sleeps one interval, then looks
    /// the record up once. Running out of attempts is an outcome, not an error.
    pub async fn poll_for_record(
        &self,
        document_key: &str,
        token: &CancellationToken,
    ) -> ServiceResult<PollOutcome> {
        let interval = self.config.uploader.poll_interval();
        let max_attempts = self.config.uploader.max_poll_attempts;

        for attempt in 1..=max_attempts {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(document_key = %document_key, attempts = attempt - 1, "Record wait cancelled");
                    return Ok(PollOutcome::Cancelled { attempts: attempt - 1 });
                }
                _ = tokio::time::sleep(interval) => {}
            }

            metrics::counter!("scribe_record_polls_total").increment(1);
            if let Some(record) = self.lookup_record(document_key)? {
                info!(document_key = %document_key, attempt, "Extraction record found");
                return Ok(PollOutcome::Found(record));
            }
            debug!(document_key = %document_key, attempt, max_attempts, "Extraction record not available yet");
        }

        info!(document_key = %document_key, attempts = max_attempts, "Extraction record not found in time");
        Ok(PollOutcome::NotFound {
            attempts: max_attempts,
        })
    }

    /// Upload, then wait for the record
    pub async fn upload_and_wait(
        &self,
        filename: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> ServiceResult<(UploadReceipt, PollOutcome)> {
        let receipt = self.upload_document(filename, content_type, body).await?;
        let outcome = self.wait_for_record(&receipt.document_key).await?;
        Ok((receipt, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScribeConfig;
    use crate::testing::{ScriptedOcr, harness, harness_with_config};
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn test_generate_document_key() {
        let key = generate_document_key("photo.jpg");
        let (id, name) = key.split_once('_').unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(name, "photo.jpg");

        assert!(generate_document_key("C:\\Users\\me\\scan.pdf").ends_with("_scan.pdf"));
        assert!(generate_document_key("../../etc/receipt.png").ends_with("_receipt.png"));
        assert_ne!(generate_document_key("a.png"), generate_document_key("a.png"));
    }

    #[test]
    fn test_validate_upload() {
        let h = harness(ScriptedOcr::new());
        let service = &h.service;

        assert!(service.validate_upload("photo.jpg", 10).is_ok());
        assert!(service.validate_upload("SCAN.PDF", 10).is_ok());
        assert!(service.validate_upload("chart.Png", 10).is_ok());

        assert!(matches!(
            service.validate_upload("notes.docx", 10),
            Err(ServiceError::UnsupportedFileType { .. })
        ));
        assert!(matches!(
            service.validate_upload("README", 10),
            Err(ServiceError::UnsupportedFileType { .. })
        ));
        assert!(matches!(
            service.validate_upload("photo.jpg", 0),
            Err(ServiceError::InvalidRequest { .. })
        ));
        assert!(matches!(
            service.validate_upload("photo.jpg", 11 * 1024 * 1024),
            Err(ServiceError::FileTooLarge { .. })
        ));
        assert!(matches!(
            service.validate_upload("dir/", 10),
            Err(ServiceError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_stores_object_and_publishes_event() {
        let mut h = harness(ScriptedOcr::new());

        let receipt = h
            .service
            .upload_document("photo.jpg", None, Bytes::from_static(b"jpeg bytes"))
            .await
            .unwrap();
        assert!(receipt.document_key.ends_with("_photo.jpg"));
        assert_eq!(receipt.filename, "photo.jpg");
        assert_eq!(receipt.content_type, "image/jpeg");
        assert_eq!(receipt.size, 10);

        let stored = h
            .service
            .objects
            .get_object("documents", &receipt.document_key)
            .await
            .unwrap();
        assert_eq!(&stored.body[..], b"jpeg bytes");
        assert_eq!(stored.etag, receipt.etag);

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.object.key, receipt.document_key);

        // Uploading never writes a record
        assert!(h.service.lookup_record(&receipt.document_key).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_keeps_explicit_content_type() {
        let h = harness(ScriptedOcr::new());

        let receipt = h
            .service
            .upload_document("scan.pdf", Some("application/x-pdf"), Bytes::from_static(b"%PDF"))
            .await
            .unwrap();
        assert_eq!(receipt.content_type, "application/x-pdf");

        let receipt = h
            .service
            .upload_document(
                "scan.pdf",
                Some("application/octet-stream"),
                Bytes::from_static(b"%PDF"),
            )
            .await
            .unwrap();
        assert_eq!(receipt.content_type, "application/pdf");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gives_up_after_max_attempts() {
        let h = harness(ScriptedOcr::new());
        let started = Instant::now();

        let outcome = h.service.wait_for_record("missing_photo.jpg").await.unwrap();

        assert_eq!(outcome, PollOutcome::NotFound { attempts: 20 });
        assert_eq!(started.elapsed(), Duration::from_secs(20));
        assert_eq!(h.service.active_waits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_record_once_written() {
        let h = harness(ScriptedOcr::new());
        let started = Instant::now();

        let records = h.service.records.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            records
                .put_if_absent(&ExtractionRecord::completed("k_photo.jpg", ""))
                .unwrap();
        });

        let outcome = h.service.wait_for_record("k_photo.jpg").await.unwrap();
        match outcome {
            PollOutcome::Found(record) => assert_eq!(record.extracted_text, ""),
            other => panic!("expected a record, got {other:?}"),
        }
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_can_be_cancelled() {
        let h = harness(ScriptedOcr::new());

        let service = h.service.clone();
        let wait = tokio::spawn(async move { service.wait_for_record("k_doc.pdf").await });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.service.active_waits(), 1);
        assert!(h.service.cancel_wait("k_doc.pdf"));
        assert!(!h.service.cancel_wait("k_doc.pdf"));

        let outcome = wait.await.unwrap().unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 1 });
        assert_eq!(h.service.active_waits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_wait_is_unregistered() {
        let h = harness(ScriptedOcr::new());

        let service = h.service.clone();
        let wait = tokio::spawn(async move { service.wait_for_record("k_doc.pdf").await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.service.active_waits(), 1);

        wait.abort();
        assert!(wait.await.unwrap_err().is_cancelled());
        assert_eq!(h.service.active_waits(), 0);
        assert!(!h.service.cancel_wait("k_doc.pdf"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_uses_configured_schedule() {
        let mut config = ScribeConfig::default();
        config.uploader.poll_interval_ms = 250;
        config.uploader.max_poll_attempts = 4;
        let h = harness_with_config(ScriptedOcr::new(), config);
        let started = Instant::now();

        let outcome = h.service.wait_for_record("k_photo.png").await.unwrap();

        assert_eq!(outcome, PollOutcome::NotFound { attempts: 4 });
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }
}
