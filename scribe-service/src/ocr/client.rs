use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{Block, DocumentSource, OcrService, TextDetectionPage};
use crate::config::OcrConfig;
use crate::error::{OcrError, ServiceError, ServiceResult};
use crate::storage::ObjectRef;

const AMZ_JSON: &str = "application/x-amz-json-1.1";
const TARGET_HEADER: &str = "X-Amz-Target";
const TARGET_PREFIX: &str = "Textract";

/// Textract-compatible OCR client.
///
/// Requests are plain JSON; signing is expected to be done by a proxy in
/// front of the endpoint (or skipped by a local emulator).
pub struct TextractClient {
    client: Client,
    endpoint: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectResponse {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

impl TextractClient {
    pub fn new(config: &OcrConfig) -> ServiceResult<Self> {
        let endpoint = config.endpoint_url();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::Ocr(OcrError::Connection {
                    url: endpoint.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, endpoint })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: serde_json::Value,
    ) -> ServiceResult<T> {
        debug!(operation, endpoint = %self.endpoint, "Calling OCR service");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, AMZ_JSON)
            .header(TARGET_HEADER, format!("{TARGET_PREFIX}.{operation}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| OcrError::Connection {
                url: self.endpoint.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (error_type, message) = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => (
                    body.error_type.unwrap_or_else(|| "UnknownError".to_string()),
                    body.message.unwrap_or(text),
                ),
                Err(_) => ("UnknownError".to_string(), text),
            };
            return Err(ServiceError::Ocr(OcrError::Service {
                status: status.as_u16(),
                error_type: short_error_type(&error_type).to_string(),
                message,
            }));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| OcrError::InvalidResponse { source: e }.into())
    }
}

/// `com.amazonaws.textract#InvalidS3ObjectException` -> `InvalidS3ObjectException`
fn short_error_type(error_type: &str) -> &str {
    error_type.rsplit('#').next().unwrap_or(error_type)
}

fn s3_object(object: &ObjectRef) -> serde_json::Value {
    serde_json::json!({ "Bucket": object.bucket, "Name": object.key })
}

#[async_trait]
impl OcrService for TextractClient {
    async fn detect_document_text(&self, document: &DocumentSource) -> ServiceResult<Vec<Block>> {
        let document = match document {
            DocumentSource::Object(object) => serde_json::json!({ "S3Object": s3_object(object) }),
            DocumentSource::Bytes(bytes) => serde_json::json!({ "Bytes": STANDARD.encode(bytes) }),
        };

        let response: DetectResponse = self
            .call("DetectDocumentText", serde_json::json!({ "Document": document }))
            .await?;
        Ok(response.blocks)
    }

    async fn start_document_text_detection(&self, object: &ObjectRef) -> ServiceResult<String> {
        let response: StartResponse = self
            .call(
                "StartDocumentTextDetection",
                serde_json::json!({ "DocumentLocation": { "S3Object": s3_object(object) } }),
            )
            .await?;
        Ok(response.job_id)
    }

    async fn get_document_text_detection(
        &self,
        job_id: &str,
        next_token: Option<&str>,
    ) -> ServiceResult<TextDetectionPage> {
        let mut body = serde_json::json!({ "JobId": job_id });
        if let Some(token) = next_token {
            body["NextToken"] = serde_json::Value::String(token.to_string());
        }
        self.call("GetDocumentTextDetection", body).await
    }
}
