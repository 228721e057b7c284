//! Downloadable artifacts for extracted text.

pub mod helvetica;
pub mod layout;
pub mod pdf;

pub use pdf::render_text_pdf;

use uuid::Uuid;

/// Original upload name for a `{uuid}_{filename}` document key.
/// Keys without a uuid prefix are returned unchanged.
pub fn original_filename(document_key: &str) -> &str {
    match document_key.split_once('_') {
        Some((prefix, rest)) if !rest.is_empty() && Uuid::parse_str(prefix).is_ok() => rest,
        _ => document_key,
    }
}

/// `"{original}_extracted.txt"`
pub fn text_artifact_name(document_key: &str) -> String {
    format!("{}_extracted.txt", original_filename(document_key))
}

/// `"{original}_extracted.pdf"`
pub fn pdf_artifact_name(document_key: &str) -> String {
    format!("{}_extracted.pdf", original_filename(document_key))
}

/// `Content-Disposition` value for a download, with the name reduced to
/// printable ASCII.
pub fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}
