//! Search index synchronization
//!
//! The stores push denormalized documents into a search index so the
//! public read path can query without joining. Only live-store writes of
//! indexable kinds are mirrored; the draft store never reaches the
//! index. Index failures are logged and swallowed - the index may
//! transiently diverge from the store, the store write never rolls back.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::db::{RecordRow, Store};
use crate::error::StudioError;
use crate::media::MediaOrder;
use crate::registry::SchemaRegistry;
use crate::relations::RelMap;

/// Namespace a record kind's documents live under, scoped per store
pub fn index_name(kind: &str, store: Store) -> String {
    format!("{}-{}", kind, store)
}

/// Denormalized document pushed to the search index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub kind: String,
    pub owner: Option<String>,
    /// Flat value-field map
    pub fields: Map<String, Value>,
    /// Relationship summary
    pub relations: RelMap,
    /// Media order summary
    pub media: MediaOrder,
}

/// Build the document for a record
pub fn build_document(record: &RecordRow) -> IndexDocument {
    IndexDocument {
        id: record.id.clone(),
        kind: record.kind.clone(),
        owner: record.owner.clone(),
        fields: record.fields.clone(),
        relations: record.rel_map.clone(),
        media: record.media_order.clone(),
    }
}

/// Write contract of the search index. Upserts and deletes only; the
/// query surface belongs to the read path.
pub trait SearchIndex: Send + Sync {
    fn upsert(&self, store: Store, doc: IndexDocument) -> Result<(), StudioError>;
    fn remove(&self, store: Store, kind: &str, id: &str) -> Result<(), StudioError>;
}

/// Called by the store adapter after a create/update lands
pub(crate) fn record_saved(
    index: &dyn SearchIndex,
    registry: &SchemaRegistry,
    store: Store,
    record: &RecordRow,
    to_index: bool,
) {
    if store != Store::Live || !to_index || !record.tracked || !registry.is_indexable(&record.kind)
    {
        return;
    }

    debug!("Indexing {} {} in {}", record.kind, record.id, store);
    if let Err(e) = index.upsert(store, build_document(record)) {
        warn!("Index upsert failed for {} {}: {}", record.kind, record.id, e);
    }
}

/// Called by the store adapter after a physical delete
pub(crate) fn record_deleted(
    index: &dyn SearchIndex,
    registry: &SchemaRegistry,
    store: Store,
    record: &RecordRow,
) {
    if store != Store::Live || !registry.is_indexable(&record.kind) {
        return;
    }

    if let Err(e) = index.remove(store, &record.kind, &record.id) {
        warn!("Index removal failed for {} {}: {}", record.kind, record.id, e);
    }
}

/// In-memory index keyed by namespace then document id. Upserting the
/// same document twice is a no-op, so replaying a save is safe.
#[derive(Default)]
pub struct InMemoryIndex {
    docs: RwLock<HashMap<String, HashMap<String, IndexDocument>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a document (read path and tests)
    pub fn fetch(&self, store: Store, kind: &str, id: &str) -> Option<IndexDocument> {
        let docs = self.docs.read().ok()?;
        docs.get(&index_name(kind, store))?.get(id).cloned()
    }

    /// Number of documents in a kind's namespace
    pub fn count(&self, store: Store, kind: &str) -> usize {
        self.docs
            .read()
            .ok()
            .and_then(|docs| docs.get(&index_name(kind, store)).map(HashMap::len))
            .unwrap_or(0)
    }
}

impl SearchIndex for InMemoryIndex {
    fn upsert(&self, store: Store, doc: IndexDocument) -> Result<(), StudioError> {
        let mut docs = self
            .docs
            .write()
            .map_err(|e| StudioError::Database(format!("Index lock poisoned: {}", e)))?;
        docs.entry(index_name(&doc.kind, store))
            .or_default()
            .insert(doc.id.clone(), doc);
        Ok(())
    }

    fn remove(&self, store: Store, kind: &str, id: &str) -> Result<(), StudioError> {
        let mut docs = self
            .docs
            .write()
            .map_err(|e| StudioError::Database(format!("Index lock poisoned: {}", e)))?;
        if let Some(namespace) = docs.get_mut(&index_name(kind, store)) {
            namespace.remove(id);
        }
        Ok(())
    }
}
