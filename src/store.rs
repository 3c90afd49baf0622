//! Record store adapter
//!
//! One uniform CRUD surface over the draft and live stores for every
//! registered record kind, plus the editor-side relationship and media
//! operations. Saves carry an index flag so bulk writers can suppress
//! reindexing; the index hook is invoked here, explicitly, after each
//! live-store write.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, records, NewRecord, RecordRow, Store, StoreDb};
use crate::error::StudioError;
use crate::index::{self, SearchIndex};
use crate::media::{self, MediaMove};
use crate::registry::{FieldKind, SchemaRegistry};
use crate::relations::{self, RelEntry, RelLevel};

/// Adapter over the two logical stores
pub struct RecordStore {
    draft: StoreDb,
    live: StoreDb,
    registry: SchemaRegistry,
    index: Arc<dyn SearchIndex>,
}

impl RecordStore {
    /// Open both store databases under the configured storage dir
    pub fn open(
        config: &Config,
        registry: SchemaRegistry,
        index: Arc<dyn SearchIndex>,
    ) -> Result<Self, StudioError> {
        std::fs::create_dir_all(&config.storage_dir)?;

        Ok(Self {
            draft: StoreDb::open(&config.draft_db_path(), Store::Draft)?,
            live: StoreDb::open(&config.live_db_path(), Store::Live)?,
            registry,
            index,
        })
    }

    /// Open both stores in memory (for testing)
    pub fn open_in_memory(
        registry: SchemaRegistry,
        index: Arc<dyn SearchIndex>,
    ) -> Result<Self, StudioError> {
        Ok(Self {
            draft: StoreDb::open_in_memory(Store::Draft)?,
            live: StoreDb::open_in_memory(Store::Live)?,
            registry,
            index,
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub(crate) fn db(&self, store: Store) -> &StoreDb {
        match store {
            Store::Draft => &self.draft,
            Store::Live => &self.live,
        }
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Get a record, or None when the id is absent or belongs to another
    /// kind
    pub fn try_get(
        &self,
        kind: &str,
        id: &str,
        store: Store,
    ) -> Result<Option<RecordRow>, StudioError> {
        let record = self.db(store).with_conn(|conn| records::get_record(conn, id))?;
        Ok(record.filter(|r| r.kind == kind))
    }

    /// Get a record or fail with NotFound
    pub fn get(&self, kind: &str, id: &str, store: Store) -> Result<RecordRow, StudioError> {
        self.try_get(kind, id, store)?.ok_or_else(|| StudioError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        })
    }

    /// Create a record with default tracking state, relationship map and
    /// media order, then read it back
    pub fn create(&self, input: NewRecord, store: Store) -> Result<RecordRow, StudioError> {
        let schema = self.registry.get(&input.kind)?;

        let record = RecordRow {
            id: input.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            kind: input.kind.clone(),
            tracked: true,
            published: false,
            owner: input.owner,
            fields: input.fields,
            rel_map: relations::default_map(schema),
            media_order: media::default_order(schema),
            created_at: db::now(),
            last_published_at: None,
        };

        self.db(store)
            .with_conn(|conn| records::insert_record(conn, &record))?;

        self.get(&record.kind, &record.id, store)
    }

    /// Persist a record. `to_index` is passed through to the index hook
    /// so bulk and migration writers can suppress reindexing.
    pub fn save(&self, record: &RecordRow, store: Store, to_index: bool) -> Result<(), StudioError> {
        self.db(store)
            .with_conn(|conn| records::upsert_record(conn, record))?;

        index::record_saved(self.index.as_ref(), &self.registry, store, record, to_index);

        Ok(())
    }

    /// Fake delete: clear the tracked flag and keep the row. Only legal
    /// against the draft store.
    pub fn soft_delete(&self, record: &mut RecordRow, store: Store) -> Result<(), StudioError> {
        if store != Store::Draft {
            return Err(StudioError::SoftDeleteOutsideDraft);
        }

        record.tracked = false;
        self.save(record, Store::Draft, true)?;

        debug!("Soft deleted {} {}", record.kind, record.id);
        Ok(())
    }

    /// Physically remove a record row. Reserved for internal cleanup.
    pub fn hard_delete(&self, record: &RecordRow, store: Store) -> Result<bool, StudioError> {
        let deleted = self
            .db(store)
            .with_conn(|conn| records::delete_record(conn, &record.id))?;

        if deleted {
            index::record_deleted(self.index.as_ref(), &self.registry, store, record);
        }

        Ok(deleted)
    }

    /// List a kind's records in a store, oldest first
    pub fn list(
        &self,
        kind: &str,
        store: Store,
        tracked_only: bool,
    ) -> Result<Vec<RecordRow>, StudioError> {
        self.registry.get(kind)?;
        self.db(store)
            .with_conn(|conn| records::list_records(conn, kind, tracked_only))
    }

    // =========================================================================
    // Relationship operations (draft-side editing surface)
    // =========================================================================

    fn field_kind(&self, record: &RecordRow, field: &str) -> Result<FieldKind, StudioError> {
        let schema = self.registry.get(&record.kind)?;
        schema
            .field_def(field)
            .map(|f| f.kind.clone())
            .ok_or_else(|| StudioError::UnknownField {
                kind: record.kind.clone(),
                field: field.to_string(),
            })
    }

    /// Link `target` into a many-to-many field on `record`. `Rels` links
    /// are mirrored on the target's map under this kind's related name;
    /// `Refs` links are one-directional. Both maps are flattened before
    /// saving, so racing double-adds collapse.
    pub fn add_relation(
        &self,
        record: &mut RecordRow,
        field: &str,
        target: &mut RecordRow,
        level: RelLevel,
    ) -> Result<(), StudioError> {
        let kind = self.field_kind(record, field)?;
        if kind != FieldKind::ManyToMany {
            return Err(StudioError::UnknownField {
                kind: record.kind.clone(),
                field: field.to_string(),
            });
        }

        let entry = record
            .rel_map
            .entry(field.to_string())
            .or_insert_with(|| RelEntry::ManyToMany { rels: vec![], refs: vec![] });
        relations::add_many(entry, &target.id, level);
        record.rel_map = relations::flatten(&record.rel_map);

        if level == RelLevel::Rels {
            let related_name = self.registry.get(&record.kind)?.related_name.clone();
            let reciprocal = target
                .rel_map
                .entry(related_name)
                .or_insert_with(|| RelEntry::ManyToMany { rels: vec![], refs: vec![] });
            relations::add_many(reciprocal, &record.id, RelLevel::Rels);
            target.rel_map = relations::flatten(&target.rel_map);
            self.save(target, Store::Draft, true)?;
        }

        self.save(record, Store::Draft, true)
    }

    /// Unlink `target` from a relational field on `record`. Removing an
    /// absent link is a no-op. A `rels` link is broken on both sides.
    pub fn remove_relation(
        &self,
        record: &mut RecordRow,
        field: &str,
        target: &mut RecordRow,
    ) -> Result<(), StudioError> {
        self.field_kind(record, field)?;

        let was_rel = matches!(
            record.rel_map.get(field),
            Some(RelEntry::ManyToMany { rels, .. }) if rels.iter().any(|id| id == &target.id)
        );

        let changed = match record.rel_map.get_mut(field) {
            Some(entry) => relations::remove_id(entry, &target.id),
            None => false,
        };

        let mut reciprocal_changed = false;
        if was_rel {
            let related_name = self.registry.get(&record.kind)?.related_name.clone();
            if let Some(entry) = target.rel_map.get_mut(&related_name) {
                reciprocal_changed = relations::remove_id(entry, &record.id);
            }
        }

        if changed {
            self.save(record, Store::Draft, true)?;
        }
        if reciprocal_changed {
            self.save(target, Store::Draft, true)?;
        }

        Ok(())
    }

    /// Point a single-link field at `target`, mirroring on the target's
    /// reciprocal field when the schema declares one
    pub fn set_single_link(
        &self,
        record: &mut RecordRow,
        field: &str,
        target: &mut RecordRow,
    ) -> Result<(), StudioError> {
        let reciprocal = match self.field_kind(record, field)? {
            FieldKind::SingleLink { reciprocal } => reciprocal,
            _ => {
                return Err(StudioError::UnknownField {
                    kind: record.kind.clone(),
                    field: field.to_string(),
                })
            }
        };

        record
            .rel_map
            .insert(field.to_string(), RelEntry::Single { id: Some(target.id.clone()) });

        if let Some(reciprocal) = reciprocal {
            target
                .rel_map
                .insert(reciprocal, RelEntry::Single { id: Some(record.id.clone()) });
            self.save(target, Store::Draft, true)?;
        }

        self.save(record, Store::Draft, true)
    }

    /// Append a child to an owned to-many field
    pub fn attach_child(
        &self,
        parent: &mut RecordRow,
        field: &str,
        child: &RecordRow,
    ) -> Result<(), StudioError> {
        if self.field_kind(parent, field)? != FieldKind::ToMany {
            return Err(StudioError::UnknownField {
                kind: parent.kind.clone(),
                field: field.to_string(),
            });
        }

        let entry = parent
            .rel_map
            .entry(field.to_string())
            .or_insert_with(|| RelEntry::ToMany { ids: vec![] });
        if let RelEntry::ToMany { ids } = entry {
            ids.push(child.id.clone());
        }
        parent.rel_map = relations::flatten(&parent.rel_map);

        self.save(parent, Store::Draft, true)
    }

    /// Remove a child from an owned to-many field; absent ids are a no-op
    pub fn detach_child(
        &self,
        parent: &mut RecordRow,
        field: &str,
        child: &RecordRow,
    ) -> Result<(), StudioError> {
        self.field_kind(parent, field)?;

        let changed = match parent.rel_map.get_mut(field) {
            Some(entry) => relations::remove_id(entry, &child.id),
            None => false,
        };
        if changed {
            self.save(parent, Store::Draft, true)?;
        }

        Ok(())
    }

    // =========================================================================
    // Media order operations (draft-side editing surface)
    // =========================================================================

    /// Read an order list, dropping stale entries
    pub fn get_order(&self, record: &RecordRow, media_kind: &str) -> Result<Vec<String>, StudioError> {
        media::get_order(&record.media_order, &record.kind, media_kind)
    }

    /// Replace an order list and persist
    pub fn set_order(
        &self,
        record: &mut RecordRow,
        media_kind: &str,
        ids: Vec<String>,
    ) -> Result<(), StudioError> {
        media::set_order(&mut record.media_order, &record.kind, media_kind, ids)?;
        self.save(record, Store::Draft, true)
    }

    /// Append a media id and persist
    pub fn extend_order(
        &self,
        record: &mut RecordRow,
        media_kind: &str,
        id: &str,
    ) -> Result<(), StudioError> {
        media::extend_order(&mut record.media_order, &record.kind, media_kind, id)?;
        self.save(record, Store::Draft, true)
    }

    /// Remove a media id and persist; absent ids are an error
    pub fn reduce_order(
        &self,
        record: &mut RecordRow,
        media_kind: &str,
        id: &str,
    ) -> Result<(), StudioError> {
        media::reduce_order(&mut record.media_order, &record.kind, media_kind, id)?;
        self.save(record, Store::Draft, true)
    }

    /// Apply a drag-and-drop move and persist
    pub fn update_order(
        &self,
        record: &mut RecordRow,
        media_kind: &str,
        mv: &MediaMove,
    ) -> Result<(), StudioError> {
        media::update_order(&mut record.media_order, &record.kind, media_kind, mv)?;
        self.save(record, Store::Draft, true)
    }
}
