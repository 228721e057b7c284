use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document not found: {document_key}")]
    DocumentNotFound { document_key: String },

    #[error("Unsupported file type: {filename} (allowed: {allowed})")]
    UnsupportedFileType { filename: String, allowed: String },

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Request body exceeds the upload limit of {max} bytes")]
    BodyTooLarge { max: u64 },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid storage event: {message}")]
    InvalidEvent { message: String },

    #[error("Extraction worker is not accepting events")]
    WorkerUnavailable,

    #[error("Object storage error")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Ocr(#[from] OcrError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Rendering failed")]
    Render(#[from] RenderError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Object storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid object key: {key:?}")]
    InvalidKey { key: String },

    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("Storage I/O failed for {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to publish storage event to {target}: {message}")]
    Notification { target: String, message: String },
}

/// OCR service client errors
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Connection failed to OCR service at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("OCR service error (status {status}) {error_type}: {message}")]
    Service {
        status: u16,
        error_type: String,
        message: String,
    },

    #[error("Invalid response from OCR service")]
    InvalidResponse {
        #[source]
        source: reqwest::Error,
    },

    #[error("OCR job {job_id} did not finish after {attempts} status checks")]
    JobTimedOut { job_id: String, attempts: u32 },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Failed to prepare database directory {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Download artifact rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to build PDF")]
    Pdf(#[source] lopdf::Error),

    #[error("Failed to write PDF")]
    Io(#[source] std::io::Error),
}

/// API error response (matches Axum's built-in JsonRejection format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DocumentNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::UnsupportedFileType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServiceError::FileTooLarge { .. } | ServiceError::BodyTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ServiceError::WorkerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::InvalidRequest { .. } | ServiceError::InvalidEvent { .. } => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Storage(StorageError::InvalidKey { .. }) => StatusCode::BAD_REQUEST,
            ServiceError::Storage(StorageError::ObjectNotFound { .. }) => StatusCode::NOT_FOUND,
            ServiceError::Ocr(OcrError::Connection { .. })
            | ServiceError::Ocr(OcrError::Service { .. })
            | ServiceError::Ocr(OcrError::InvalidResponse { .. }) => StatusCode::BAD_GATEWAY,
            ServiceError::Ocr(OcrError::JobTimedOut { .. }) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::UnsupportedFileType { .. } => "unsupported_file_type",
            ServiceError::FileTooLarge { .. } | ServiceError::BodyTooLarge { .. } => {
                "file_too_large"
            }
            ServiceError::WorkerUnavailable => "worker_unavailable",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::InvalidEvent { .. } => "invalid_event",
            ServiceError::Storage(StorageError::InvalidKey { .. }) => "invalid_object_key",
            ServiceError::Storage(StorageError::ObjectNotFound { .. }) => "object_not_found",
            ServiceError::Storage(StorageError::Io { .. }) => "storage_io_error",
            ServiceError::Storage(StorageError::Notification { .. }) => "storage_event_error",
            ServiceError::Ocr(OcrError::Connection { .. }) => "ocr_connection",
            ServiceError::Ocr(OcrError::Service { .. }) => "ocr_service_error",
            ServiceError::Ocr(OcrError::InvalidResponse { .. }) => "ocr_invalid_response",
            ServiceError::Ocr(OcrError::JobTimedOut { .. }) => "ocr_job_timed_out",
            ServiceError::Database(_) => "database_error",
            ServiceError::Render(_) => "render_error",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and all of its sources as a single `a: b: c` line for logs.
pub fn format_error_chain_ref(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = ServiceError::UnsupportedFileType {
            filename: "notes.docx".to_string(),
            allowed: "png, jpg, jpeg, pdf".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.error_code(), "unsupported_file_type");

        let err = ServiceError::Ocr(OcrError::JobTimedOut {
            job_id: "job-1".to_string(),
            attempts: 3,
        });
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let err = ServiceError::DocumentNotFound {
            document_key: "abc_photo.jpg".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ServiceError::BodyTooLarge { max: 1024 };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.error_code(), "file_too_large");

        assert_eq!(
            ServiceError::WorkerUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_format_error_chain() {
        let err = ServiceError::Storage(StorageError::Io {
            path: "objects/docs/a.pdf".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });
        let chain = format_error_chain_ref(&err);
        assert_eq!(
            chain,
            "Object storage error: Storage I/O failed for objects/docs/a.pdf: denied"
        );
    }
}
