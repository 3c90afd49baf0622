//! SQLite database module for the two logical stores
//!
//! Edits land in the draft store; publishing projects records into the
//! live store consumed by the public read path. Both stores share the
//! `records` table; the change ledger tables exist in the draft store
//! only.

pub mod changes;
pub mod records;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StudioError;

/// Which logical store an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    Draft,
    Live,
}

impl Store {
    pub fn as_str(&self) -> &'static str {
        match self {
            Store::Draft => "draft",
            Store::Live => "live",
        }
    }
}

impl std::fmt::Display for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current timestamp in the TEXT format both stores use. Microsecond
/// precision keeps staging order stable under lexicographic sort.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// One SQLite database behind a mutex
pub struct StoreDb {
    conn: Mutex<Connection>,
    store: Store,
}

impl StoreDb {
    /// Open or create a store database
    pub fn open(path: &Path, store: Store) -> Result<Self, StudioError> {
        info!("Opening {} store at {:?}", store, path);

        let conn = Connection::open(path)
            .map_err(|e| StudioError::Database(format!("Failed to open SQLite: {}", e)))?;

        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StudioError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
            store,
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory(store: Store) -> Result<Self, StudioError> {
        debug!("Opening in-memory {} store", store);

        let conn = Connection::open_in_memory()
            .map_err(|e| StudioError::Database(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
            store,
        };
        db.init_schema()?;

        Ok(db)
    }

    pub fn store(&self) -> Store {
        self.store
    }

    fn init_schema(&self) -> Result<(), StudioError> {
        self.with_conn(|conn| schema::init_schema(conn, self.store))
    }

    /// Run a read operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StudioError>
    where
        F: FnOnce(&Connection) -> Result<T, StudioError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StudioError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a write operation with exclusive access (for transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StudioError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StudioError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StudioError::Database(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}

// Re-exports
pub use changes::{ChangeGroupRow, ChangeRow, NewChange, StageType};
pub use records::{NewRecord, RecordRow};
