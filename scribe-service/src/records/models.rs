//! Extraction record model.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Outcome stored with an extraction record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// OCR finished and the text is complete
    Completed,
    /// The OCR job reported failure; text holds whatever lines were returned
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Completed => "completed",
            ExtractionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "failed" => ExtractionStatus::Failed,
            _ => ExtractionStatus::Completed,
        }
    }
}

/// One row per processed document, keyed by the object key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub document_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub extracted_text: String,
    pub status: ExtractionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionRecord {
    /// A completed record timestamped now
    pub fn completed(document_name: impl Into<String>, extracted_text: impl Into<String>) -> Self {
        Self {
            document_name: document_name.into(),
            uploaded_at: Utc::now(),
            extracted_text: extracted_text.into(),
            status: ExtractionStatus::Completed,
            error: None,
        }
    }

    /// A failed record timestamped now
    pub fn failed(
        document_name: impl Into<String>,
        extracted_text: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            document_name: document_name.into(),
            uploaded_at: Utc::now(),
            extracted_text: extracted_text.into(),
            status: ExtractionStatus::Failed,
            error: Some(error.into()),
        }
    }

    /// ISO-8601 UTC timestamp as stored in the table
    pub fn uploaded_at_string(&self) -> String {
        self.uploaded_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let uploaded_at_str: String = row.get(1)?;
        let status_str: String = row.get(3)?;

        Ok(Self {
            document_name: row.get(0)?,
            uploaded_at: DateTime::parse_from_rfc3339(&uploaded_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
            extracted_text: row.get(2)?,
            status: ExtractionStatus::parse(&status_str),
            error: row.get(4)?,
        })
    }
}
