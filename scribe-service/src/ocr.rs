//! OCR service abstraction.
//!
//! The protocol mirrors Textract's text detection API: a synchronous
//! `DetectDocumentText` call for single images and an asynchronous
//! `StartDocumentTextDetection`/`GetDocumentTextDetection` job for
//! multi-page documents. Both return content blocks; only `LINE` blocks
//! contribute to the extracted text.

pub mod client;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::ServiceResult;
use crate::storage::ObjectRef;

pub use client::TextractClient;

/// Kind of content block returned by the OCR service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Page,
    Line,
    Word,
    #[serde(other)]
    Other,
}

/// A unit of recognized content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub block_type: BlockType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl Block {
    pub fn line(text: impl Into<String>) -> Self {
        Self::with_type(BlockType::Line, text)
    }

    pub fn word(text: impl Into<String>) -> Self {
        Self::with_type(BlockType::Word, text)
    }

    fn with_type(block_type: BlockType, text: impl Into<String>) -> Self {
        Self {
            block_type,
            text: Some(text.into()),
            id: None,
            confidence: None,
            page: None,
        }
    }
}

/// Status of an asynchronous text detection job
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
    PartialSuccess,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

/// One page of `GetDocumentTextDetection` results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextDetectionPage {
    pub job_status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Document input for synchronous detection
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// The service reads the object from storage itself
    Object(ObjectRef),
    /// Raw bytes sent with the request
    Bytes(Bytes),
}

/// Which OCR path a document takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Multi-page document, asynchronous job
    Pdf,
    /// Single image, synchronous call
    Image,
}

impl DocumentKind {
    pub fn from_key(key: &str) -> Self {
        if key.to_ascii_lowercase().ends_with(".pdf") {
            DocumentKind::Pdf
        } else {
            DocumentKind::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image => "image",
        }
    }
}

#[async_trait]
pub trait OcrService: Send + Sync {
    /// Synchronous detection for a single image
    async fn detect_document_text(&self, document: &DocumentSource) -> ServiceResult<Vec<Block>>;

    /// Submit an asynchronous detection job, returning its id
    async fn start_document_text_detection(&self, object: &ObjectRef) -> ServiceResult<String>;

    /// Fetch job status and one page of results
    async fn get_document_text_detection(
        &self,
        job_id: &str,
        next_token: Option<&str>,
    ) -> ServiceResult<TextDetectionPage>;
}

/// Join the text of every `LINE` block, in service order, with newlines.
pub fn assemble_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter(|block| block.block_type == BlockType::Line)
        .map(|block| block.text.as_deref().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Number of `LINE` blocks
pub fn line_count(blocks: &[Block]) -> usize {
    blocks
        .iter()
        .filter(|block| block.block_type == BlockType::Line)
        .count()
}
