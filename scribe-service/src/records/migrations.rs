//! Record table schema.

use rusqlite::Connection;

use crate::error::{DatabaseError, ServiceResult};

/// Create the record table if it does not exist yet.
pub(super) fn run_migrations(conn: &Connection, table: &str) -> ServiceResult<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_name TEXT NOT NULL UNIQUE,
            uploaded_at TEXT NOT NULL,
            extracted_text TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'completed',
            error TEXT
        );
        "#
    ))
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    Ok(())
}
