//! Change and change-group row operations
//!
//! Draft store only. Changes are append-only; commit is the single
//! mutation they ever see.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::StudioError;

/// What kind of mutation a change records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    Created,
    Updated,
    Deleted,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Created => "created",
            StageType::Updated => "updated",
            StageType::Deleted => "deleted",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created" => Some(StageType::Created),
            "updated" => Some(StageType::Updated),
            "deleted" => Some(StageType::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for StageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change row from the draft store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRow {
    pub id: i64,
    pub stage_type: StageType,
    pub description: String,
    pub kind: String,
    /// Id of the copy snapshot in the draft store
    pub object_id: String,
    /// Stable record identity
    pub base_id: String,
    pub parent_kind: Option<String>,
    pub parent_id: Option<String>,
    /// Single-link state of the base record at staging time
    pub single_links: BTreeMap<String, String>,
    /// Many-to-many state of the base record at staging time
    pub many_to_many: BTreeMap<String, Vec<String>>,
    pub created_at: String,
    pub committed: bool,
    pub committed_at: Option<String>,
    pub reverted: bool,
    pub reverted_at: Option<String>,
    pub actor: Option<String>,
}

impl ChangeRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let raw_stage: String = row.get("stage_type")?;
        let stage_type = StageType::parse(&raw_stage).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown stage type '{}'", raw_stage).into(),
            )
        })?;

        Ok(Self {
            id: row.get("id")?,
            stage_type,
            description: row.get("description")?,
            kind: row.get("kind")?,
            object_id: row.get("object_id")?,
            base_id: row.get("base_id")?,
            parent_kind: row.get("parent_kind")?,
            parent_id: row.get("parent_id")?,
            single_links: parse_json_column(row, "single_links_json")?,
            many_to_many: parse_json_column(row, "many_to_many_json")?,
            created_at: row.get("created_at")?,
            committed: row.get("committed")?,
            committed_at: row.get("committed_at")?,
            reverted: row.get("reverted")?,
            reverted_at: row.get("reverted_at")?,
            actor: row.get("actor")?,
        })
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

/// Input for recording a change
#[derive(Debug, Clone)]
pub struct NewChange {
    pub stage_type: StageType,
    pub description: String,
    pub kind: String,
    pub object_id: String,
    pub base_id: String,
    pub parent_kind: Option<String>,
    pub parent_id: Option<String>,
    pub single_links: BTreeMap<String, String>,
    pub many_to_many: BTreeMap<String, Vec<String>>,
    pub actor: String,
}

/// Insert a change and read it back
pub fn insert_change(conn: &Connection, input: &NewChange) -> Result<ChangeRow, StudioError> {
    conn.execute(
        r#"
        INSERT INTO changes (
            stage_type, description, kind, object_id, base_id,
            parent_kind, parent_id, single_links_json, many_to_many_json,
            created_at, committed, actor
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        "#,
        params![
            input.stage_type.as_str(),
            input.description,
            input.kind,
            input.object_id,
            input.base_id,
            input.parent_kind,
            input.parent_id,
            serde_json::to_string(&input.single_links)?,
            serde_json::to_string(&input.many_to_many)?,
            super::now(),
            input.actor,
        ],
    )
    .map_err(|e| StudioError::Database(format!("Failed to insert change: {}", e)))?;

    let id = conn.last_insert_rowid();
    get_change(conn, id)?.ok_or_else(|| {
        StudioError::Database("Change not found after insert".to_string())
    })
}

/// Get a change by ID
pub fn get_change(conn: &Connection, id: i64) -> Result<Option<ChangeRow>, StudioError> {
    conn.query_row("SELECT * FROM changes WHERE id = ?", params![id], |row| {
        ChangeRow::from_row(row)
    })
    .optional()
    .map_err(|e| StudioError::Database(format!("Failed to get change: {}", e)))
}

/// Changes of one kind staged by one actor, staging order ascending
pub fn list_for_kind(
    conn: &Connection,
    kind: &str,
    actor: &str,
    committed: bool,
) -> Result<Vec<ChangeRow>, StudioError> {
    query_changes(
        conn,
        "SELECT * FROM changes WHERE kind = ? AND actor = ? AND committed = ?
         ORDER BY created_at, id",
        params![kind, actor, committed],
    )
}

/// Changes for one base record, staging order ascending
pub fn list_for_record(
    conn: &Connection,
    kind: &str,
    base_id: &str,
    committed: bool,
) -> Result<Vec<ChangeRow>, StudioError> {
    query_changes(
        conn,
        "SELECT * FROM changes WHERE kind = ? AND base_id = ? AND committed = ?
         ORDER BY created_at, id",
        params![kind, base_id, committed],
    )
}

/// Uncommitted changes for a record or any of its children, staging
/// order ascending. This is the publish selection.
pub fn list_publishable(
    conn: &Connection,
    kind: &str,
    record_id: &str,
) -> Result<Vec<ChangeRow>, StudioError> {
    query_changes(
        conn,
        "SELECT * FROM changes
         WHERE committed = 0
           AND ((kind = ?1 AND base_id = ?2) OR (parent_kind = ?1 AND parent_id = ?2))
         ORDER BY created_at, id",
        params![kind, record_id],
    )
}

fn query_changes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ChangeRow>, StudioError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| StudioError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params, ChangeRow::from_row)
        .map_err(|e| StudioError::Database(format!("Failed to query changes: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| StudioError::Database(format!("Failed to read row: {}", e)))?);
    }

    Ok(results)
}

/// Stamp a change as committed
pub fn mark_committed(conn: &Connection, id: i64, committed_at: &str) -> Result<(), StudioError> {
    let changed = conn
        .execute(
            "UPDATE changes SET committed = 1, committed_at = ? WHERE id = ?",
            params![committed_at, id],
        )
        .map_err(|e| StudioError::Database(format!("Failed to mark change committed: {}", e)))?;

    if changed == 0 {
        return Err(StudioError::NotFound {
            kind: "change".to_string(),
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Change group row from the draft store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeGroupRow {
    pub id: i64,
    pub description: String,
    pub created_at: String,
    pub scope_kind: Option<String>,
    pub scope_id: Option<String>,
    pub actor: Option<String>,
}

impl ChangeGroupRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
            scope_kind: row.get("scope_kind")?,
            scope_id: row.get("scope_id")?,
            actor: row.get("actor")?,
        })
    }
}

/// Record a publish event and link its committed changes
pub fn insert_group(
    conn: &Connection,
    description: &str,
    scope: Option<(&str, &str)>,
    actor: &str,
    change_ids: &[i64],
) -> Result<ChangeGroupRow, StudioError> {
    conn.execute(
        "INSERT INTO change_groups (description, created_at, scope_kind, scope_id, actor)
         VALUES (?, ?, ?, ?, ?)",
        params![
            description,
            super::now(),
            scope.map(|(kind, _)| kind),
            scope.map(|(_, id)| id),
            actor,
        ],
    )
    .map_err(|e| StudioError::Database(format!("Failed to insert change group: {}", e)))?;

    let group_id = conn.last_insert_rowid();
    for change_id in change_ids {
        conn.execute(
            "INSERT OR IGNORE INTO change_group_members (group_id, change_id) VALUES (?, ?)",
            params![group_id, change_id],
        )
        .map_err(|e| StudioError::Database(format!("Failed to link group member: {}", e)))?;
    }

    conn.query_row(
        "SELECT * FROM change_groups WHERE id = ?",
        params![group_id],
        ChangeGroupRow::from_row,
    )
    .map_err(|e| StudioError::Database(format!("Failed to read change group: {}", e)))
}

/// Ids of the changes a group committed
pub fn group_member_ids(conn: &Connection, group_id: i64) -> Result<Vec<i64>, StudioError> {
    let mut stmt = conn
        .prepare("SELECT change_id FROM change_group_members WHERE group_id = ? ORDER BY change_id")
        .map_err(|e| StudioError::Database(format!("Failed to prepare statement: {}", e)))?;

    let ids = stmt
        .query_map(params![group_id], |row| row.get(0))
        .map_err(|e| StudioError::Database(format!("Failed to query group members: {}", e)))?
        .collect::<Result<Vec<i64>, _>>()
        .map_err(|e| StudioError::Database(format!("Failed to read row: {}", e)))?;

    Ok(ids)
}
