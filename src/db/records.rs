//! Record row CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StudioError;
use crate::media::MediaOrder;
use crate::relations::RelMap;

/// Record row from a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: String,
    pub kind: String,
    /// Soft-delete marker; false means the record is fake-deleted
    pub tracked: bool,
    pub published: bool,
    pub owner: Option<String>,
    /// Flat value-field map
    pub fields: Map<String, Value>,
    pub rel_map: RelMap,
    pub media_order: MediaOrder,
    pub created_at: String,
    pub last_published_at: Option<String>,
}

impl RecordRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            kind: row.get("kind")?,
            tracked: row.get("tracked")?,
            published: row.get("published")?,
            owner: row.get("owner")?,
            fields: parse_json_column(row, "fields_json")?,
            rel_map: parse_json_column(row, "rel_map_json")?,
            media_order: parse_json_column(row, "media_order_json")?,
            created_at: row.get("created_at")?,
            last_published_at: row.get("last_published_at")?,
        })
    }

    /// Human-readable handle used in change descriptions: the record's
    /// title when it has one, its id otherwise.
    pub fn display_name(&self) -> &str {
        self.fields
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.id)
    }
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    row: &Row,
    column: &str,
) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StudioError> {
    Ok(serde_json::to_string(value)?)
}

/// Input for creating a record
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRecord {
    /// Explicit id; a fresh UUID is generated when omitted
    #[serde(default)]
    pub id: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Get a record by ID
pub fn get_record(conn: &Connection, id: &str) -> Result<Option<RecordRow>, StudioError> {
    conn.query_row("SELECT * FROM records WHERE id = ?", params![id], |row| {
        RecordRow::from_row(row)
    })
    .optional()
    .map_err(|e| StudioError::Database(format!("Failed to get record: {}", e)))
}

/// Insert a record row. Fails on id collision.
pub fn insert_record(conn: &Connection, record: &RecordRow) -> Result<(), StudioError> {
    conn.execute(
        r#"
        INSERT INTO records (
            id, kind, tracked, published, owner,
            fields_json, rel_map_json, media_order_json,
            created_at, last_published_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            record.id,
            record.kind,
            record.tracked,
            record.published,
            record.owner,
            to_json(&record.fields)?,
            to_json(&record.rel_map)?,
            to_json(&record.media_order)?,
            record.created_at,
            record.last_published_at,
        ],
    )
    .map_err(|e| StudioError::Database(format!("Failed to insert record: {}", e)))?;

    Ok(())
}

/// Insert or fully replace a record row under its id
pub fn upsert_record(conn: &Connection, record: &RecordRow) -> Result<(), StudioError> {
    conn.execute(
        r#"
        INSERT INTO records (
            id, kind, tracked, published, owner,
            fields_json, rel_map_json, media_order_json,
            created_at, last_published_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            kind = excluded.kind,
            tracked = excluded.tracked,
            published = excluded.published,
            owner = excluded.owner,
            fields_json = excluded.fields_json,
            rel_map_json = excluded.rel_map_json,
            media_order_json = excluded.media_order_json,
            created_at = excluded.created_at,
            last_published_at = excluded.last_published_at
        "#,
        params![
            record.id,
            record.kind,
            record.tracked,
            record.published,
            record.owner,
            to_json(&record.fields)?,
            to_json(&record.rel_map)?,
            to_json(&record.media_order)?,
            record.created_at,
            record.last_published_at,
        ],
    )
    .map_err(|e| StudioError::Database(format!("Failed to upsert record: {}", e)))?;

    Ok(())
}

/// Physically delete a record row
pub fn delete_record(conn: &Connection, id: &str) -> Result<bool, StudioError> {
    let changes = conn
        .execute("DELETE FROM records WHERE id = ?", params![id])
        .map_err(|e| StudioError::Database(format!("Failed to delete record: {}", e)))?;

    Ok(changes > 0)
}

/// List records of a kind, oldest first
pub fn list_records(
    conn: &Connection,
    kind: &str,
    tracked_only: bool,
) -> Result<Vec<RecordRow>, StudioError> {
    let sql = if tracked_only {
        "SELECT * FROM records WHERE kind = ? AND tracked = 1 ORDER BY created_at, id"
    } else {
        "SELECT * FROM records WHERE kind = ? ORDER BY created_at, id"
    };

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| StudioError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params![kind], RecordRow::from_row)
        .map_err(|e| StudioError::Database(format!("Failed to query records: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| StudioError::Database(format!("Failed to read row: {}", e)))?);
    }

    Ok(results)
}
