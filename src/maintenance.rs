//! Internal maintenance sweeps
//!
//! Schema evolution support: when a record kind gains or loses
//! relational fields, stored relationship maps are reconciled in bulk.
//! Each reconciled record is staged as an update under the supplied
//! actor, normally a system actor.

use serde::Serialize;
use tracing::{debug, info};

use crate::actor::Actor;
use crate::db::{Store, StageType};
use crate::error::StudioError;
use crate::ledger::ChangeLedger;
use crate::relations;

/// What a relationship-map sweep touched
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    /// Tracked records of the kind found in the draft store
    pub examined: usize,
    /// Records whose maps were actually reconciled
    pub migrated: usize,
    /// Update changes staged for the reconciled records
    pub staged: usize,
}

/// Rebuild the relationship map of every tracked draft record of a kind
/// against the current schema. Records whose maps already match are left
/// alone. `to_index` is passed through to the saves so a large sweep can
/// skip reindexing.
pub fn migrate_rel_maps(
    ledger: &ChangeLedger,
    kind: &str,
    actor: &Actor,
    to_index: bool,
) -> Result<MigrationReport, StudioError> {
    let store = ledger.record_store();
    let schema = store.registry().get(kind)?.clone();
    let records = store.list(kind, Store::Draft, true)?;

    let mut report = MigrationReport {
        examined: records.len(),
        ..Default::default()
    };

    for mut record in records {
        if relations::matches_schema(&record.rel_map, &schema) {
            continue;
        }

        debug!("Reconciling relationship map of {} {}", kind, record.id);
        record.rel_map = relations::migrate(&record.rel_map, &schema);
        store.save(&record, Store::Draft, to_index)?;
        report.migrated += 1;

        ledger.stage(StageType::Updated, &record, actor, None)?;
        report.staged += 1;
    }

    info!(
        "Relationship map sweep for {}: {} examined, {} migrated",
        kind, report.examined, report.migrated
    );
    Ok(report)
}
