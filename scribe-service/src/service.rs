//! Upload, wait and extraction workflows.
//!
//! The uploader and the extraction worker share nothing but storage: the
//! uploader writes an object, the object store publishes a storage-write
//! event, and the worker answers it with exactly one extraction record keyed
//! by the object key.
//!
//! - Upload validation and the bounded record wait
//! - Cancellation of in-flight waits
//! - Event handling, OCR dispatch and the background event worker

mod cancellation;
mod uploader;
mod worker;

pub use uploader::{PollOutcome, UploadReceipt};

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ScribeConfig;
use crate::error::ServiceResult;
use crate::events::StorageEvent;
use crate::ocr::{OcrService, TextractClient};
use crate::records::RecordStore;
use crate::storage::{EventPublisher, FsObjectStore, ObjectStore};

/// Message shown when the record did not appear before the wait ran out
pub const NOT_FOUND_MESSAGE: &str = "Text not found yet. Try again after a few seconds.";

/// Main service coordinator
pub struct ScribeService {
    pub config: Arc<ScribeConfig>,
    pub objects: Arc<dyn ObjectStore>,
    pub records: Arc<RecordStore>,
    pub ocr: Arc<dyn OcrService>,
    /// Cancellation tokens of in-flight record waits, keyed by document key
    wait_tokens: DashMap<String, cancellation::WaitEntry>,
}

impl ScribeService {
    pub fn new(
        config: Arc<ScribeConfig>,
        objects: Arc<dyn ObjectStore>,
        records: Arc<RecordStore>,
        ocr: Arc<dyn OcrService>,
    ) -> Self {
        Self {
            config,
            objects,
            records,
            ocr,
            wait_tokens: DashMap::new(),
        }
    }

    /// Wire up the filesystem object store, SQLite record store and OCR client.
    ///
    /// `event_tx` is the local worker queue; when present every stored object
    /// is announced on it. A configured notification URL is notified as well.
    pub fn from_config(
        config: Arc<ScribeConfig>,
        event_tx: Option<mpsc::Sender<StorageEvent>>,
    ) -> ServiceResult<Self> {
        info!(role = config.role.as_str(), "Initializing Scribe service");

        let mut publisher = EventPublisher::new();
        if let Some(tx) = event_tx {
            publisher = publisher.with_channel(tx);
        }
        if let Some(url) = &config.storage.notification_url {
            info!(url = %url, "Storage events will be delivered to webhook");
            publisher = publisher.with_webhook(
                url.clone(),
                Duration::from_secs(config.ocr.request_timeout_secs),
            );
        }
        if publisher.is_empty() && config.role.runs_uploader() {
            warn!("No storage event sink configured, uploads will never be extracted");
        }

        let objects = Arc::new(FsObjectStore::new(config.storage.objects_dir(), publisher));

        let records = Arc::new(RecordStore::open(
            &config.storage.database_path(),
            &config.records.table,
        )?);
        info!(
            path = %config.storage.database_path().display(),
            table = %config.records.table,
            "Record store opened"
        );

        let ocr = Arc::new(TextractClient::new(&config.ocr)?);
        info!(endpoint = %config.ocr.endpoint_url(), "OCR client initialized");

        Ok(Self::new(config, objects, records, ocr))
    }
}
