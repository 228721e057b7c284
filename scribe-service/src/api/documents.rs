//! Document API endpoints.
//!
//! Upload (with or without waiting), the record wait, record lookup, the two
//! download artifacts and wait cancellation.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ServiceError, ServiceResult};
use crate::records::{ExtractionRecord, ExtractionStatus};
use crate::render::{
    attachment_disposition, original_filename, pdf_artifact_name, render_text_pdf,
    text_artifact_name,
};
use crate::service::{NOT_FOUND_MESSAGE, PollOutcome, UploadReceipt};

use super::AppState;

/// How a record wait ended, as returned to the client
#[derive(Default, Serialize)]
pub struct WaitResult {
    /// `uploaded`, `completed`, `failed`, `not_found` or `cancelled`
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl WaitResult {
    /// Stored but not waited for
    fn uploaded() -> (StatusCode, Self) {
        let result = Self {
            status: "uploaded",
            ..Self::default()
        };
        (StatusCode::ACCEPTED, result)
    }

    fn from_outcome(document_key: &str, outcome: PollOutcome) -> (StatusCode, Self) {
        let mut result = Self {
            status: outcome.as_str(),
            ..Self::default()
        };

        let status = match outcome {
            PollOutcome::Found(record) => {
                result.status = record.status.as_str();
                result.uploaded_at = Some(record.uploaded_at_string());
                result.text_url = Some(format!("/api/documents/{document_key}/text"));
                result.pdf_url = Some(format!("/api/documents/{document_key}/pdf"));
                result.extracted_text = Some(record.extracted_text);
                result.error = record.error;
                StatusCode::OK
            }
            PollOutcome::NotFound { attempts } => {
                result.message = Some(NOT_FOUND_MESSAGE.to_string());
                result.attempts = Some(attempts);
                StatusCode::ACCEPTED
            }
            PollOutcome::Cancelled { attempts } => {
                result.message = Some("Waiting for the extracted text was cancelled.".to_string());
                result.attempts = Some(attempts);
                StatusCode::OK
            }
        };

        (status, result)
    }
}

/// Result of an upload, and of the wait that followed it when requested
#[derive(Serialize)]
pub struct UploadResponse {
    pub document_key: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub wait_url: String,
    #[serde(flatten)]
    pub result: WaitResult,
}

impl UploadResponse {
    fn new(receipt: UploadReceipt, result: WaitResult) -> Self {
        Self {
            wait_url: format!("/api/documents/{}/wait", receipt.document_key),
            document_key: receipt.document_key,
            filename: receipt.filename,
            content_type: receipt.content_type,
            size: receipt.size,
            result,
        }
    }
}

#[derive(Serialize)]
pub struct WaitResponse {
    pub document_key: String,
    #[serde(flatten)]
    pub result: WaitResult,
}

#[derive(Deserialize)]
pub struct UploadParams {
    /// Wait for the extraction record before answering
    #[serde(default = "default_wait")]
    pub wait: bool,
}

fn default_wait() -> bool {
    true
}

/// Lines in stored text; empty text has none
fn text_line_count(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        text.split('\n').count()
    }
}

/// Stored extraction record
#[derive(Serialize)]
pub struct DocumentRecordResponse {
    pub document_key: String,
    pub filename: String,
    pub uploaded_at: String,
    pub status: ExtractionStatus,
    pub extracted_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub line_count: usize,
}

impl From<ExtractionRecord> for DocumentRecordResponse {
    fn from(record: ExtractionRecord) -> Self {
        Self {
            filename: original_filename(&record.document_name).to_string(),
            uploaded_at: record.uploaded_at_string(),
            status: record.status,
            line_count: text_line_count(&record.extracted_text),
            document_key: record.document_name,
            extracted_text: record.extracted_text,
            error: record.error,
        }
    }
}

#[derive(Serialize)]
pub struct CancelWaitResponse {
    pub document_key: String,
    pub cancelled: bool,
}

/// Multipart read failures; bodies over the upload limit are 413
fn multipart_error(error: MultipartError, max_upload_bytes: u64) -> ServiceError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::BodyTooLarge {
            max: max_upload_bytes,
        }
    } else {
        ServiceError::InvalidRequest {
            message: error.body_text(),
        }
    }
}

/// Upload a document and, unless `?wait=false`, wait for its extracted text
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> ServiceResult<(StatusCode, Json<UploadResponse>)> {
    let max_upload_bytes = state.service.config.uploader.max_upload_bytes;
    let mut upload: Option<(String, Option<String>, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_upload_bytes))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, max_upload_bytes))?;
        upload = Some((filename, content_type, data));
    }

    let (filename, content_type, data) = upload.ok_or_else(|| ServiceError::InvalidRequest {
        message: "multipart field `file` is required".to_string(),
    })?;

    let (receipt, (status, result)) = if params.wait {
        let (receipt, outcome) = state
            .service
            .upload_and_wait(&filename, content_type.as_deref(), data)
            .await?;
        let result = WaitResult::from_outcome(&receipt.document_key, outcome);
        (receipt, result)
    } else {
        let receipt = state
            .service
            .upload_document(&filename, content_type.as_deref(), data)
            .await?;
        (receipt, WaitResult::uploaded())
    };

    Ok((status, Json(UploadResponse::new(receipt, result))))
}

/// Wait for the extraction record of an uploaded document
pub async fn wait_for_document_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ServiceResult<(StatusCode, Json<WaitResponse>)> {
    let outcome = state.service.wait_for_record(&key).await?;
    let (status, result) = WaitResult::from_outcome(&key, outcome);
    Ok((
        status,
        Json(WaitResponse {
            document_key: key,
            result,
        }),
    ))
}

/// Get the extraction record of a document
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ServiceResult<Json<DocumentRecordResponse>> {
    let record = state.service.get_record(&key)?;
    Ok(Json(record.into()))
}

/// Extracted text as a plain-text download
pub async fn download_text_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ServiceResult<Response> {
    let record = state.service.get_record(&key)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                attachment_disposition(&text_artifact_name(&key)),
            ),
        ],
        record.extracted_text,
    )
        .into_response())
}

/// Extracted text rendered as a paginated PDF download
pub async fn download_pdf_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ServiceResult<Response> {
    let record = state.service.get_record(&key)?;
    let pdf = render_text_pdf(&record.extracted_text)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime::APPLICATION_PDF.to_string()),
            (
                header::CONTENT_DISPOSITION,
                attachment_disposition(&pdf_artifact_name(&key)),
            ),
        ],
        pdf,
    )
        .into_response())
}

/// Cancel every in-flight wait on a document
pub async fn cancel_wait_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<CancelWaitResponse> {
    let cancelled = state.service.cancel_wait(&key);
    Json(CancelWaitResponse {
        document_key: key,
        cancelled,
    })
}
