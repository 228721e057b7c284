//! Test fixtures: a scripted OCR service and a service over temporary storage.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::config::ScribeConfig;
use crate::error::{OcrError, ServiceResult};
use crate::events::StorageEvent;
use crate::ocr::{Block, DocumentSource, JobStatus, OcrService, TextDetectionPage};
use crate::records::RecordStore;
use crate::service::ScribeService;
use crate::storage::{EventPublisher, FsObjectStore, ObjectRef};

/// OCR service that replays scripted responses and records every call.
///
/// Synchronous detections pop `detect_blocks` (empty once exhausted). Job
/// status checks pop `job_pages`; once exhausted the job stays `IN_PROGRESS`.
#[derive(Default)]
pub struct ScriptedOcr {
    detect_blocks: Mutex<VecDeque<Vec<Block>>>,
    job_pages: Mutex<VecDeque<TextDetectionPage>>,
    detect_failures: AtomicU32,
    calls: Mutex<Vec<String>>,
    sources: Mutex<Vec<DocumentSource>>,
    next_tokens: Mutex<Vec<Option<String>>>,
}

impl ScriptedOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detect_blocks(self, blocks: Vec<Block>) -> Self {
        self.detect_blocks.lock().unwrap().push_back(blocks);
        self
    }

    pub fn with_job_pages(self, pages: Vec<TextDetectionPage>) -> Self {
        self.job_pages.lock().unwrap().extend(pages);
        self
    }

    /// Fail the next `times` synchronous detections with a service error
    pub fn failing_detect(self, times: u32) -> Self {
        self.detect_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sources(&self) -> Vec<DocumentSource> {
        self.sources.lock().unwrap().clone()
    }

    /// `NextToken` argument of every status check, in order
    pub fn next_tokens(&self) -> Vec<Option<String>> {
        self.next_tokens.lock().unwrap().clone()
    }

    fn record_call(&self, operation: &str) {
        self.calls.lock().unwrap().push(operation.to_string());
    }
}

#[async_trait]
impl OcrService for ScriptedOcr {
    async fn detect_document_text(&self, document: &DocumentSource) -> ServiceResult<Vec<Block>> {
        self.record_call("DetectDocumentText");
        self.sources.lock().unwrap().push(document.clone());

        let remaining = self.detect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.detect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(OcrError::Service {
                status: 500,
                error_type: "InternalServerError".to_string(),
                message: "scripted failure".to_string(),
            }
            .into());
        }

        Ok(self
            .detect_blocks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn start_document_text_detection(&self, _object: &ObjectRef) -> ServiceResult<String> {
        self.record_call("StartDocumentTextDetection");
        Ok("job-1".to_string())
    }

    async fn get_document_text_detection(
        &self,
        _job_id: &str,
        next_token: Option<&str>,
    ) -> ServiceResult<TextDetectionPage> {
        self.record_call("GetDocumentTextDetection");
        self.next_tokens
            .lock()
            .unwrap()
            .push(next_token.map(str::to_string));

        Ok(self
            .job_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| job_page(JobStatus::InProgress, vec![], None)))
    }
}

pub fn job_page(
    status: JobStatus,
    blocks: Vec<Block>,
    next_token: Option<&str>,
) -> TextDetectionPage {
    TextDetectionPage {
        job_status: status,
        status_message: None,
        blocks,
        next_token: next_token.map(str::to_string),
    }
}

pub struct TestHarness {
    pub service: Arc<ScribeService>,
    pub ocr: Arc<ScriptedOcr>,
    /// Events published by the object store
    pub events: mpsc::Receiver<StorageEvent>,
    _dir: TempDir,
}

pub fn harness(ocr: ScriptedOcr) -> TestHarness {
    harness_with_config(ocr, ScribeConfig::default())
}

/// Service with a filesystem object store in a temp dir, an in-memory record
/// store and the given OCR script.
pub fn harness_with_config(ocr: ScriptedOcr, mut config: ScribeConfig) -> TestHarness {
    let dir = TempDir::new().unwrap();
    config.storage.data_dir = dir.path().to_path_buf();

    let (tx, events) = mpsc::channel(16);
    let objects = Arc::new(FsObjectStore::new(
        config.storage.objects_dir(),
        EventPublisher::new().with_channel(tx),
    ));
    let records = Arc::new(RecordStore::open_in_memory(&config.records.table).unwrap());
    let ocr = Arc::new(ocr);

    let service = Arc::new(ScribeService::new(
        Arc::new(config),
        objects,
        records,
        ocr.clone(),
    ));

    TestHarness {
        service,
        ocr,
        events,
        _dir: dir,
    }
}
