//! Upload repository for the immutable `uploads` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::job::Upload;

fn from_row(row: &Row<'_>) -> Result<Upload, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Upload {
        upload_id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        filename: row.get("filename")?,
        size_bytes: row.get("size_bytes")?,
        mime_type: row.get("mime_type")?,
        content: row.get("content")?,
        created_at,
    })
}

/// Inserts a new upload with its content.
pub fn insert(db: &Database, upload: &Upload) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO uploads (id, owner_id, filename, size_bytes, mime_type, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                upload.upload_id,
                upload.owner_id,
                upload.filename,
                upload.size_bytes,
                upload.mime_type,
                upload.content,
                upload.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Finds an upload, including its content.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Upload>, DatabaseError> {
    db.with_conn(|conn| {
        let upload = conn
            .query_row("SELECT * FROM uploads WHERE id = ?1", params![id], from_row)
            .optional()?;
        Ok(upload)
    })
}

/// Returns the owner of an upload without loading its content.
pub fn find_owner(db: &Database, id: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| find_owner_in(conn, id))
}

pub fn find_owner_in(conn: &Connection, id: &str) -> Result<Option<String>, DatabaseError> {
    let owner = conn
        .query_row(
            "SELECT owner_id FROM uploads WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(owner)
}

/// Whether the upload exists, on an already locked connection or transaction.
pub fn exists_in(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM uploads WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Deletes an upload. Jobs, profiles and vectors cascade.
pub fn delete_in(conn: &Connection, id: &str) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM uploads WHERE id = ?1", params![id])?)
}
