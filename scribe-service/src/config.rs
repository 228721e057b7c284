//! Service configuration loaded from `config.toml` and `SCRIBE__*` environment variables.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Which halves of the pipeline this process runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    /// Uploader and worker in one process, events delivered over a local channel
    #[default]
    All,
    /// Upload and viewing API only
    Uploader,
    /// Storage event endpoint and extraction worker only
    Worker,
}

impl ServiceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRole::All => "all",
            ServiceRole::Uploader => "uploader",
            ServiceRole::Worker => "worker",
        }
    }

    pub fn runs_uploader(&self) -> bool {
        matches!(self, ServiceRole::All | ServiceRole::Uploader)
    }

    pub fn runs_worker(&self) -> bool {
        matches!(self, ServiceRole::All | ServiceRole::Worker)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScribeConfig {
    #[serde(default)]
    pub role: ServiceRole,

    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_records")]
    pub records: RecordsConfig,

    #[serde(default = "default_ocr")]
    pub ocr: OcrConfig,

    #[serde(default = "default_uploader")]
    pub uploader: UploaderConfig,

    #[serde(default = "default_worker")]
    pub worker: WorkerConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Bucket that uploads are written to
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Optional webhook that receives storage-write notifications.
    /// Used when the worker runs in a separate process.
    #[serde(default)]
    pub notification_url: Option<String>,
}

impl StorageConfig {
    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("records.db")
    }
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecordsConfig {
    #[serde(default = "default_table")]
    pub table: String,
}

/// OCR service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_region")]
    pub region: String,

    /// Explicit endpoint; derived from the region when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Send image bytes inline instead of an object reference
    #[serde(default)]
    pub inline_images: bool,
}

impl OcrConfig {
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://textract.{}.amazonaws.com", self.region),
        }
    }
}

/// Upload and result polling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploaderConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl UploaderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Extraction worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,

    #[serde(default = "default_max_job_poll_attempts")]
    pub max_job_poll_attempts: u32,

    #[serde(default = "default_max_event_attempts")]
    pub max_event_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl WorkerConfig {
    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl ScribeConfig {
    /// Load configuration from `config.toml` (optional) and environment variables
    pub fn load() -> ServiceResult<Self> {
        let config: ScribeConfig = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("SCRIBE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build config: {}", e),
            })?
            .try_deserialize()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to deserialize config: {}", e),
            })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ServiceResult<()> {
        if self.storage.bucket.trim().is_empty() {
            return Err(ServiceError::Config {
                message: "storage.bucket must not be empty".to_string(),
            });
        }
        if self.uploader.max_poll_attempts == 0 {
            return Err(ServiceError::Config {
                message: "uploader.max_poll_attempts must be at least 1".to_string(),
            });
        }
        if self.worker.max_job_poll_attempts == 0 || self.worker.max_event_attempts == 0 {
            return Err(ServiceError::Config {
                message: "worker attempt limits must be at least 1".to_string(),
            });
        }
        if self.uploader.allowed_extensions.is_empty() {
            return Err(ServiceError::Config {
                message: "uploader.allowed_extensions must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            role: ServiceRole::default(),
            server: default_server(),
            storage: default_storage(),
            records: default_records(),
            ocr: default_ocr(),
            uploader: default_uploader(),
            worker: default_worker(),
        }
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
        bucket: default_bucket(),
        notification_url: None,
    }
}

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

pub(crate) fn default_bucket() -> String {
    "documents".to_string()
}

pub(crate) fn default_records() -> RecordsConfig {
    RecordsConfig {
        table: default_table(),
    }
}

pub(crate) fn default_table() -> String {
    "DocumentRecords".to_string()
}

pub(crate) fn default_ocr() -> OcrConfig {
    OcrConfig {
        region: default_region(),
        endpoint: None,
        request_timeout_secs: default_request_timeout(),
        inline_images: false,
    }
}

pub(crate) fn default_region() -> String {
    "us-east-1".to_string()
}

pub(crate) fn default_request_timeout() -> u64 {
    30
}

pub(crate) fn default_uploader() -> UploaderConfig {
    UploaderConfig {
        poll_interval_ms: default_poll_interval_ms(),
        max_poll_attempts: default_max_poll_attempts(),
        max_upload_bytes: default_max_upload_bytes(),
        allowed_extensions: default_allowed_extensions(),
    }
}

pub(crate) fn default_poll_interval_ms() -> u64 {
    1000
}

pub(crate) fn default_max_poll_attempts() -> u32 {
    20
}

pub(crate) fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

pub(crate) fn default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "pdf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn default_worker() -> WorkerConfig {
    WorkerConfig {
        job_poll_interval_ms: default_job_poll_interval_ms(),
        max_job_poll_attempts: default_max_job_poll_attempts(),
        max_event_attempts: default_max_event_attempts(),
        retry_backoff_ms: default_retry_backoff_ms(),
        event_queue_capacity: default_event_queue_capacity(),
    }
}

pub(crate) fn default_job_poll_interval_ms() -> u64 {
    1000
}

pub(crate) fn default_max_job_poll_attempts() -> u32 {
    300
}

pub(crate) fn default_max_event_attempts() -> u32 {
    3
}

pub(crate) fn default_retry_backoff_ms() -> u64 {
    1000
}

pub(crate) fn default_event_queue_capacity() -> usize {
    64
}
