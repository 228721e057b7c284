//! Record store for extraction results (SQLite).
//!
//! One row per document key. The key column is unique, so lookups are point
//! reads and a second write for the same key is a no-op.

mod migrations;
pub mod models;

pub use models::{ExtractionRecord, ExtractionStatus};

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{DatabaseError, ServiceError, ServiceResult};

const COLUMNS: &str = "document_name, uploaded_at, extracted_text, status, error";

#[derive(Debug)]
pub struct RecordStore {
    conn: Mutex<Connection>,
    table: String,
}

impl RecordStore {
    /// Open or create the record store at the given path
    pub fn open(path: &Path, table: &str) -> ServiceResult<Self> {
        validate_table_name(table)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(DatabaseError::Connection)?;

        // WAL lets the uploader read while the worker writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(DatabaseError::Query)?;

        Self::with_connection(conn, table)
    }

    /// In-memory store, used by tests
    #[cfg(test)]
    pub fn open_in_memory(table: &str) -> ServiceResult<Self> {
        validate_table_name(table)?;
        let conn = Connection::open_in_memory().map_err(DatabaseError::Connection)?;
        Self::with_connection(conn, table)
    }

    fn with_connection(conn: Connection, table: &str) -> ServiceResult<Self> {
        migrations::run_migrations(&conn, table)?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    fn conn(&self) -> ServiceResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ServiceError::Internal {
            message: "record store connection lock poisoned".to_string(),
        })
    }

    /// Insert a record unless one already exists for its document key.
    /// Returns whether the record was written.
    pub fn put_if_absent(&self, record: &ExtractionRecord) -> ServiceResult<bool> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                &format!(
                    r#"INSERT INTO "{}" ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(document_name) DO NOTHING"#,
                    self.table
                ),
                params![
                    record.document_name,
                    record.uploaded_at_string(),
                    record.extracted_text,
                    record.status.as_str(),
                    record.error,
                ],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Point read by document key
    pub fn get(&self, document_name: &str) -> ServiceResult<Option<ExtractionRecord>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                r#"SELECT {COLUMNS} FROM "{}" WHERE document_name = ?1"#,
                self.table
            ),
            params![document_name],
            ExtractionRecord::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Every record whose document key matches, oldest first
    #[cfg(test)]
    pub fn scan_by_document_name(&self, document_name: &str) -> ServiceResult<Vec<ExtractionRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                r#"SELECT {COLUMNS} FROM "{}" WHERE document_name = ?1 ORDER BY id"#,
                self.table
            ))
            .map_err(DatabaseError::Query)?;

        let records = stmt
            .query_map(params![document_name], ExtractionRecord::from_row)
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok(records)
    }

    /// Total number of records
    pub fn count(&self) -> ServiceResult<usize> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(&format!(r#"SELECT COUNT(*) FROM "{}""#, self.table), [], |row| {
                row.get(0)
            })
            .map_err(DatabaseError::Query)?;

        Ok(count as usize)
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are allowed.
fn validate_table_name(table: &str) -> ServiceResult<()> {
    let mut chars = table.chars();
    let valid = table.len() <= 64
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ServiceError::Config {
            message: format!("invalid record table name {table:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_and_get() {
        let store = RecordStore::open_in_memory("DocumentRecords").unwrap();
        assert!(store.get("k_photo.jpg").unwrap().is_none());

        let record = ExtractionRecord::completed("k_photo.jpg", "Hello\nWorld");
        assert!(store.put_if_absent(&record).unwrap());

        let stored = store.get("k_photo.jpg").unwrap().unwrap();
        assert_eq!(stored.extracted_text, "Hello\nWorld");
        assert_eq!(stored.status, ExtractionStatus::Completed);
        assert_eq!(stored.uploaded_at_string(), record.uploaded_at_string());
        assert!(stored.error.is_none());
    }

    #[test]
    fn test_second_write_is_ignored() {
        let store = RecordStore::open_in_memory("DocumentRecords").unwrap();

        assert!(
            store
                .put_if_absent(&ExtractionRecord::completed("k_doc.pdf", "first"))
                .unwrap()
        );
        assert!(
            !store
                .put_if_absent(&ExtractionRecord::completed("k_doc.pdf", "second"))
                .unwrap()
        );

        let matches = store.scan_by_document_name("k_doc.pdf").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].extracted_text, "first");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_empty_text_is_a_record() {
        let store = RecordStore::open_in_memory("DocumentRecords").unwrap();
        store
            .put_if_absent(&ExtractionRecord::failed("k_doc.pdf", "", "FAILED"))
            .unwrap();

        let stored = store.get("k_doc.pdf").unwrap().unwrap();
        assert_eq!(stored.extracted_text, "");
        assert_eq!(stored.status, ExtractionStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("FAILED"));
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("records.db");

        let store = RecordStore::open(&path, "DocumentRecords").unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(path.exists());

        store
            .put_if_absent(&ExtractionRecord::failed("k_scan.pdf", "", "FAILED"))
            .unwrap();
        drop(store);

        // Reopening keeps the schema and its rows
        let store = RecordStore::open(&path, "DocumentRecords").unwrap();
        let stored = store.get("k_scan.pdf").unwrap().unwrap();
        assert_eq!(stored.status, ExtractionStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("FAILED"));
    }

    #[test]
    fn test_open_reports_directory_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = RecordStore::open(&blocker.join("records.db"), "DocumentRecords").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Database(DatabaseError::Io { .. })
        ));
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        assert!(RecordStore::open_in_memory("Records; DROP TABLE x").is_err());
        assert!(RecordStore::open_in_memory("1records").is_err());
        assert!(RecordStore::open_in_memory("").is_err());
        assert!(RecordStore::open_in_memory("document_records_v2").is_ok());
    }
}
