//! Extraction worker: storage-write events in, one extraction record out.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{OcrError, ServiceResult, format_error_chain_ref};
use crate::events::StorageEvent;
use crate::ocr::{Block, DocumentKind, DocumentSource, JobStatus, assemble_text, line_count};
use crate::records::ExtractionRecord;
use crate::service::ScribeService;
use crate::storage::ObjectRef;

/// What handling one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    /// The OCR job failed; a record with empty text was stored
    Failed,
    /// A record already existed for the key
    Skipped,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Completed => "completed",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionOutcome {
    pub document_key: String,
    pub status: OutcomeStatus,
    pub line_count: usize,
    pub characters: usize,
}

impl ExtractionOutcome {
    fn skipped(document_key: &str) -> Self {
        Self {
            document_key: document_key.to_string(),
            status: OutcomeStatus::Skipped,
            line_count: 0,
            characters: 0,
        }
    }
}

/// OCR result before it becomes a record
struct Extraction {
    blocks: Vec<Block>,
    /// Status message of a failed job
    failure: Option<String>,
}

impl ScribeService {
    /// Run OCR for a newly stored object and persist its record.
    ///
    /// Exactly one record is written per document key; an event for a key that
    /// already has one is skipped without calling the OCR service.
    pub async fn handle_storage_event(
        &self,
        event: &StorageEvent,
    ) -> ServiceResult<ExtractionOutcome> {
        let object = &event.object;
        let key = object.key.as_str();

        if self.records.get(key)?.is_some() {
            info!(document_key = %key, "Record already exists, skipping event");
            metrics::counter!("scribe_extractions_total", "outcome" => "skipped").increment(1);
            return Ok(ExtractionOutcome::skipped(key));
        }

        let kind = DocumentKind::from_key(key);
        info!(object = %object, kind = kind.as_str(), "Extracting text");

        let extraction = match kind {
            DocumentKind::Pdf => self.run_text_detection_job(object).await?,
            DocumentKind::Image => self.detect_image_text(object).await?,
        };

        let text = assemble_text(&extraction.blocks);
        let lines = line_count(&extraction.blocks);
        let characters = text.chars().count();
        let (record, status) = match extraction.failure {
            None => (ExtractionRecord::completed(key, text), OutcomeStatus::Completed),
            Some(message) => {
                warn!(document_key = %key, status_message = %message, "OCR job failed, storing failed record");
                (
                    ExtractionRecord::failed(key, text, message),
                    OutcomeStatus::Failed,
                )
            }
        };

        if !self.records.put_if_absent(&record)? {
            info!(document_key = %key, "Record was written concurrently, keeping the first");
            metrics::counter!("scribe_extractions_total", "outcome" => "skipped").increment(1);
            return Ok(ExtractionOutcome::skipped(key));
        }

        metrics::counter!(
            "scribe_extractions_total",
            "path" => kind.as_str(),
            "outcome" => status.as_str()
        )
        .increment(1);
        info!(
            document_key = %key,
            lines,
            characters,
            status = status.as_str(),
            "Extraction record stored"
        );

        Ok(ExtractionOutcome {
            document_key: key.to_string(),
            status,
            line_count: lines,
            characters,
        })
    }

    /// Synchronous detection for single images
    async fn detect_image_text(&self, object: &ObjectRef) -> ServiceResult<Extraction> {
        let source = if self.config.ocr.inline_images {
            let stored = self.objects.get_object(&object.bucket, &object.key).await?;
            debug!(object = %object, size = stored.body.len(), "Sending image bytes inline");
            DocumentSource::Bytes(stored.body)
        } else {
            DocumentSource::Object(object.clone())
        };

        let blocks = self.ocr.detect_document_text(&source).await?;
        Ok(Extraction {
            blocks,
            failure: None,
        })
    }

    /// Submit an asynchronous detection job and wait for it to finish.
    ///
    /// Status is checked right after submission and then once per interval,
    /// at most `max_job_poll_attempts` times. Result pages are followed
    /// through `NextToken` once the job is terminal.
    async fn run_text_detection_job(&self, object: &ObjectRef) -> ServiceResult<Extraction> {
        let worker = &self.config.worker;
        let job_id = self.ocr.start_document_text_detection(object).await?;
        info!(object = %object, job_id = %job_id, "Text detection job started");

        let started = Instant::now();
        let mut attempts = 0;
        let first_page = loop {
            attempts += 1;
            let page = self.ocr.get_document_text_detection(&job_id, None).await?;
            debug!(job_id = %job_id, status = %page.job_status, attempts, "Job status");

            if page.job_status.is_terminal() {
                break page;
            }
            if attempts >= worker.max_job_poll_attempts {
                warn!(job_id = %job_id, attempts, "Giving up on text detection job");
                return Err(OcrError::JobTimedOut { job_id, attempts }.into());
            }
            tokio::time::sleep(worker.job_poll_interval()).await;
        };

        metrics::histogram!("scribe_ocr_job_wait_seconds").record(started.elapsed().as_secs_f64());

        let status = first_page.job_status;
        let status_message = first_page.status_message;
        let mut blocks = first_page.blocks;
        let mut next_token = first_page.next_token;
        while let Some(token) = next_token {
            let page = self
                .ocr
                .get_document_text_detection(&job_id, Some(&token))
                .await?;
            blocks.extend(page.blocks);
            next_token = page.next_token;
        }

        info!(job_id = %job_id, status = %status, blocks = blocks.len(), "Text detection job finished");

        let failure = match status {
            JobStatus::Failed => Some(
                status_message.unwrap_or_else(|| format!("text detection job {job_id} failed")),
            ),
            JobStatus::PartialSuccess => {
                warn!(
                    job_id = %job_id,
                    status_message = status_message.as_deref().unwrap_or_default(),
                    "Text detection job partially succeeded"
                );
                None
            }
            _ => None,
        };

        Ok(Extraction { blocks, failure })
    }

    /// Handle one event, retrying failures with doubling backoff.
    pub async fn process_event_with_retries(
        &self,
        event: &StorageEvent,
    ) -> ServiceResult<ExtractionOutcome> {
        let max_attempts = self.config.worker.max_event_attempts;
        let mut backoff = self.config.worker.retry_backoff();
        let mut attempt = 1;

        loop {
            match self.handle_storage_event(event).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        object = %event.object,
                        attempt,
                        max_attempts,
                        error = %format_error_chain_ref(&e),
                        "Event handling failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    metrics::counter!("scribe_extractions_total", "outcome" => "error").increment(1);
                    return Err(e);
                }
            }
        }
    }

    /// Start the background worker consuming queued events, published locally
    /// or received on the event endpoint. Events are handled one at a time
    /// until the channel closes or `shutdown` fires.
    pub fn start_event_worker(
        service: Arc<ScribeService>,
        mut events: mpsc::Receiver<StorageEvent>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Extraction worker started");
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                match service.process_event_with_retries(&event).await {
                    Ok(outcome) => debug!(
                        document_key = %outcome.document_key,
                        status = outcome.status.as_str(),
                        lines = outcome.line_count,
                        characters = outcome.characters,
                        "Storage event handled"
                    ),
                    Err(e) => error!(
                        object = %event.object,
                        error = %format_error_chain_ref(&e),
                        "Giving up on storage event"
                    ),
                }
            }
            info!("Extraction worker stopped");
        })
    }
}
