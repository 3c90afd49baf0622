//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::StudioError;

use super::Store;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize a store's schema
pub fn init_schema(conn: &Connection, store: Store) -> Result<(), StudioError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new {} store schema v{}", store, SCHEMA_VERSION);
        create_tables(conn, store)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating {} store schema from v{} to v{}",
            store, current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        info!("{} store schema is up to date (v{})", store, current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, StudioError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| StudioError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StudioError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| StudioError::Database(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| StudioError::Database(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables for a store
fn create_tables(conn: &Connection, store: Store) -> Result<(), StudioError> {
    conn.execute_batch(RECORDS_SCHEMA)
        .map_err(|e| StudioError::Database(format!("Failed to create records table: {}", e)))?;

    // The change ledger lives in the draft store only
    if store == Store::Draft {
        conn.execute_batch(LEDGER_SCHEMA)
            .map_err(|e| StudioError::Database(format!("Failed to create ledger tables: {}", e)))?;
    }

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), StudioError> {
    // Add migration steps here as the schema evolves
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Records table schema, shared by both stores
const RECORDS_SCHEMA: &str = r#"
-- One row per record. Field values, the relationship map and the media
-- order are JSON columns; the schema registry knows their shape.
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY NOT NULL,
    kind TEXT NOT NULL,

    -- Soft-delete marker; a fake delete clears this instead of removing the row
    tracked INTEGER NOT NULL DEFAULT 1,
    published INTEGER NOT NULL DEFAULT 0,

    owner TEXT,

    fields_json TEXT NOT NULL DEFAULT '{}',
    rel_map_json TEXT NOT NULL DEFAULT '{}',
    media_order_json TEXT NOT NULL DEFAULT '{}',

    created_at TEXT NOT NULL,
    last_published_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);
CREATE INDEX IF NOT EXISTS idx_records_kind_tracked ON records(kind, tracked);
"#;

/// Change ledger schema, draft store only
const LEDGER_SCHEMA: &str = r#"
-- One row per staged mutation. object_id points at the copy snapshot,
-- base_id at the stable record identity.
CREATE TABLE IF NOT EXISTS changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stage_type TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',

    kind TEXT NOT NULL,
    object_id TEXT NOT NULL,
    base_id TEXT NOT NULL,

    parent_kind TEXT,
    parent_id TEXT,

    -- Snapshots of the base record's link state at staging time
    single_links_json TEXT NOT NULL DEFAULT '{}',
    many_to_many_json TEXT NOT NULL DEFAULT '{}',

    created_at TEXT NOT NULL,
    committed INTEGER NOT NULL DEFAULT 0,
    committed_at TEXT,
    reverted INTEGER NOT NULL DEFAULT 0,
    reverted_at TEXT,

    actor TEXT
);

-- One row per publish event
CREATE TABLE IF NOT EXISTS change_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    scope_kind TEXT,
    scope_id TEXT,
    actor TEXT
);

CREATE TABLE IF NOT EXISTS change_group_members (
    group_id INTEGER NOT NULL,
    change_id INTEGER NOT NULL,
    PRIMARY KEY (group_id, change_id),
    FOREIGN KEY (group_id) REFERENCES change_groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_changes_committed ON changes(committed);
CREATE INDEX IF NOT EXISTS idx_changes_base ON changes(kind, base_id);
CREATE INDEX IF NOT EXISTS idx_changes_parent ON changes(parent_kind, parent_id);
CREATE INDEX IF NOT EXISTS idx_group_members_group ON change_group_members(group_id);
"#;
