//! Change ledger
//!
//! Every mutation made through the editing API is staged: the record's
//! current state is duplicated into a copy-on-write snapshot with a
//! fresh identity, and a change row records what happened to whom. The
//! stable identity (the base record) is what the rest of the system
//! keeps operating on; commit later projects the snapshot into the live
//! store under that base id.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::actor::Actor;
use crate::db::{self, changes, records, ChangeRow, NewChange, RecordRow, StageType, Store};
use crate::error::StudioError;
use crate::relations::{self, RelEntry};
use crate::store::RecordStore;

/// Staging and committing of record mutations
pub struct ChangeLedger {
    store: Arc<RecordStore>,
}

impl ChangeLedger {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub fn record_store(&self) -> &RecordStore {
        &self.store
    }

    // =========================================================================
    // Staging
    // =========================================================================

    /// Stage a mutation. The snapshot insert and the change insert share
    /// one draft transaction: a failure partway leaves no orphaned
    /// duplicate. Returns the base record; callers keep working with the
    /// stable identity, never the snapshot.
    pub fn stage(
        &self,
        stage_type: StageType,
        record: &RecordRow,
        actor: &Actor,
        parent: Option<&RecordRow>,
    ) -> Result<RecordRow, StudioError> {
        let schema = self.store.registry().get(&record.kind)?.clone();
        let actor_name = actor.name.clone();
        let actor_id = actor.id.clone();
        let parent_ref = parent.map(|p| (p.kind.clone(), p.id.clone()));

        let (change, base) = self.store.db(Store::Draft).with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StudioError::Database(format!("Failed to start transaction: {}", e)))?;

            // Copy-on-write snapshot: fresh identity, untracked, unique
            // values disambiguated, single links not duplicated (a
            // duplicated unique link would collide with the base's).
            let mut copy = record.clone();
            copy.id = Uuid::new_v4().to_string();
            copy.tracked = false;
            for field in schema.unique_value_fields() {
                if let Some(Value::String(current)) = copy.fields.get(field).cloned() {
                    copy.fields.insert(
                        field.to_string(),
                        Value::String(format!("{}-{}", current, Uuid::new_v4())),
                    );
                }
            }
            for entry in copy.rel_map.values_mut() {
                if let RelEntry::Single { id } = entry {
                    *id = None;
                }
            }
            records::insert_record(&tx, &copy)?;

            // The base record keeps the original identity
            let base = records::get_record(&tx, &record.id)?
                .filter(|r| r.kind == record.kind)
                .ok_or_else(|| StudioError::NotFound {
                    kind: record.kind.clone(),
                    id: record.id.clone(),
                })?;

            let description = format!(
                "{} {} {} {}",
                actor_name,
                stage_type,
                base.kind,
                base.display_name()
            );

            let change = changes::insert_change(
                &tx,
                &NewChange {
                    stage_type,
                    description,
                    kind: base.kind.clone(),
                    object_id: copy.id.clone(),
                    base_id: base.id.clone(),
                    parent_kind: parent_ref.as_ref().map(|(kind, _)| kind.clone()),
                    parent_id: parent_ref.as_ref().map(|(_, id)| id.clone()),
                    single_links: snapshot_single_links(&base),
                    many_to_many: snapshot_many_to_many(&base),
                    actor: actor_id,
                },
            )?;

            tx.commit()
                .map_err(|e| StudioError::Database(format!("Failed to commit transaction: {}", e)))?;

            Ok((change, base))
        })?;

        debug!("Staged change {}: {}", change.id, change.description);
        Ok(base)
    }

    pub fn stage_created(
        &self,
        record: &RecordRow,
        actor: &Actor,
        parent: Option<&RecordRow>,
    ) -> Result<RecordRow, StudioError> {
        self.stage(StageType::Created, record, actor, parent)
    }

    pub fn stage_updated(
        &self,
        record: &RecordRow,
        actor: &Actor,
        parent: Option<&RecordRow>,
    ) -> Result<RecordRow, StudioError> {
        self.stage(StageType::Updated, record, actor, parent)
    }

    pub fn stage_deleted(
        &self,
        record: &RecordRow,
        actor: &Actor,
        parent: Option<&RecordRow>,
    ) -> Result<RecordRow, StudioError> {
        self.stage(StageType::Deleted, record, actor, parent)
    }

    pub fn stage_created_or_updated(
        &self,
        record: &RecordRow,
        actor: &Actor,
        parent: Option<&RecordRow>,
        created: bool,
    ) -> Result<RecordRow, StudioError> {
        if created {
            self.stage_created(record, actor, parent)
        } else {
            self.stage_updated(record, actor, parent)
        }
    }

    /// Stage the same mutation across a list of records. Sequential and
    /// fail-fast: a failure partway leaves the earlier records staged.
    pub fn bulk_stage(
        &self,
        stage_type: StageType,
        records: &[RecordRow],
        actor: &Actor,
        parent: Option<&RecordRow>,
    ) -> Result<Vec<RecordRow>, StudioError> {
        records
            .iter()
            .map(|record| self.stage(stage_type, record, actor, parent))
            .collect()
    }

    pub fn bulk_stage_created(
        &self,
        records: &[RecordRow],
        actor: &Actor,
        parent: Option<&RecordRow>,
    ) -> Result<Vec<RecordRow>, StudioError> {
        self.bulk_stage(StageType::Created, records, actor, parent)
    }

    pub fn bulk_stage_updated(
        &self,
        records: &[RecordRow],
        actor: &Actor,
        parent: Option<&RecordRow>,
    ) -> Result<Vec<RecordRow>, StudioError> {
        self.bulk_stage(StageType::Updated, records, actor, parent)
    }

    pub fn bulk_stage_deleted(
        &self,
        records: &[RecordRow],
        actor: &Actor,
        parent: Option<&RecordRow>,
    ) -> Result<Vec<RecordRow>, StudioError> {
        self.bulk_stage(StageType::Deleted, records, actor, parent)
    }

    // =========================================================================
    // Committing
    // =========================================================================

    /// Commit a change: project the staged state into the live store
    /// under the base id and stamp the change committed. A deleted
    /// change needs no store work - the fake delete is already visible
    /// everywhere as `tracked = false`.
    ///
    /// By default the copy snapshot is committed; `commit_base` projects
    /// the base record's current draft state instead.
    pub fn commit(
        &self,
        change: &ChangeRow,
        to_index: bool,
        commit_base: bool,
    ) -> Result<ChangeRow, StudioError> {
        if change.stage_type != StageType::Deleted {
            // Flag the base as published so the editing UI can show
            // what is visible on the public site.
            let mut base = self.store.get(&change.kind, &change.base_id, Store::Draft)?;
            if !base.published {
                base.published = true;
            }
            base.last_published_at = Some(db::now());
            self.store.save(&base, Store::Draft, true)?;

            let mut outgoing = if commit_base {
                base
            } else {
                self.store
                    .get(&change.kind, &change.object_id, Store::Draft)
                    .map_err(|e| StudioError::CommitFailed {
                        change_id: change.id,
                        reason: e.to_string(),
                    })?
            };

            outgoing.fields = denormalize_fields(&outgoing.fields);
            outgoing.id = change.base_id.clone();
            outgoing.tracked = true;
            // Cross-store single links are not guaranteed to resolve;
            // drop them. The owner column survives untouched.
            for entry in outgoing.rel_map.values_mut() {
                if let RelEntry::Single { id } = entry {
                    *id = None;
                }
            }

            self.store
                .save(&outgoing, Store::Live, to_index)
                .map_err(|e| StudioError::CommitFailed {
                    change_id: change.id,
                    reason: e.to_string(),
                })?;
        }

        let committed_at = db::now();
        let committed = self.store.db(Store::Draft).with_conn(|conn| {
            changes::mark_committed(conn, change.id, &committed_at)?;
            changes::get_change(conn, change.id)?.ok_or_else(|| StudioError::NotFound {
                kind: "change".to_string(),
                id: change.id.to_string(),
            })
        })?;

        info!("Committed change {}: {}", committed.id, committed.description);
        Ok(committed)
    }

    /// Revert is intentionally unsupported: there is no defined
    /// semantics for undoing a commit across the two stores.
    pub fn revert(&self, _change: &ChangeRow) -> Result<ChangeRow, StudioError> {
        Err(StudioError::RevertUnsupported)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Changes of one kind staged by one actor, staging order ascending
    pub fn changes_for_kind(
        &self,
        kind: &str,
        actor: &Actor,
        committed: bool,
    ) -> Result<Vec<ChangeRow>, StudioError> {
        self.store
            .db(Store::Draft)
            .with_conn(|conn| changes::list_for_kind(conn, kind, &actor.id, committed))
    }

    /// Changes for one record, staging order ascending
    pub fn changes_for_record(
        &self,
        record: &RecordRow,
        committed: bool,
    ) -> Result<Vec<ChangeRow>, StudioError> {
        self.store
            .db(Store::Draft)
            .with_conn(|conn| changes::list_for_record(conn, &record.kind, &record.id, committed))
    }

    /// Commit every uncommitted change for a record, in staging order.
    /// Any failure propagates: within one record's scope, publishing is
    /// all-or-nothing.
    pub fn commit_for_record(&self, record: &RecordRow) -> Result<Vec<ChangeRow>, StudioError> {
        let pending = self.changes_for_record(record, false)?;
        pending
            .iter()
            .map(|change| self.commit(change, true, false))
            .collect()
    }
}

fn snapshot_single_links(record: &RecordRow) -> BTreeMap<String, String> {
    record
        .rel_map
        .iter()
        .filter_map(|(name, entry)| match entry {
            RelEntry::Single { id: Some(id) } => Some((name.clone(), id.clone())),
            _ => None,
        })
        .collect()
}

fn snapshot_many_to_many(record: &RecordRow) -> BTreeMap<String, Vec<String>> {
    record
        .rel_map
        .iter()
        .filter_map(|(name, entry)| match entry {
            RelEntry::ManyToMany { rels, refs } => {
                let mut ids = rels.clone();
                ids.extend(refs.iter().cloned());
                Some((name.clone(), relations::dedup(&ids)))
            }
            _ => None,
        })
        .collect()
}

/// Collapse structured sub-instance fields into the flat shape the live
/// store expects: a value of `{"sub_instances": [{"fields": [{"name",
/// "value"}, ...]}, ...]}` becomes a list of plain name-to-value
/// objects. Other values pass through untouched.
fn denormalize_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), denormalize_value(value)))
        .collect()
}

fn denormalize_value(value: &Value) -> Value {
    let sub_instances = match value.get("sub_instances").and_then(Value::as_array) {
        Some(list) => list,
        None => return value.clone(),
    };

    let flattened: Vec<Value> = sub_instances
        .iter()
        .map(|sub| {
            let mut flat = Map::new();
            if let Some(entries) = sub.get("fields").and_then(Value::as_array) {
                for entry in entries {
                    if let (Some(name), Some(val)) =
                        (entry.get("name").and_then(Value::as_str), entry.get("value"))
                    {
                        flat.insert(name.to_string(), val.clone());
                    }
                }
            }
            Value::Object(flat)
        })
        .collect();

    Value::Array(flattened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_denormalize_flattens_sub_instances() {
        let mut fields = Map::new();
        fields.insert("title".to_string(), json!("A title"));
        fields.insert(
            "statistics".to_string(),
            json!({
                "sub_instances": [
                    {"fields": [{"name": "icon", "value": "star"}, {"name": "value", "value": "10"}]},
                    {"fields": [{"name": "icon", "value": "flag"}]},
                ]
            }),
        );

        let flat = denormalize_fields(&fields);
        assert_eq!(flat["title"], json!("A title"));
        assert_eq!(
            flat["statistics"],
            json!([{"icon": "star", "value": "10"}, {"icon": "flag"}])
        );
    }

    #[test]
    fn test_denormalize_empty_sub_instances() {
        let mut fields = Map::new();
        fields.insert("references".to_string(), json!({"sub_instances": []}));

        let flat = denormalize_fields(&fields);
        assert_eq!(flat["references"], json!([]));
    }
}
