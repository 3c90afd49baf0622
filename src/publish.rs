//! Publish coordination
//!
//! A publish event groups ledger commits: either every pending change
//! for one record (and its children), or an explicit list covering a
//! whole editing session. Each event is recorded as a change group for
//! the audit trail.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::actor::Actor;
use crate::db::{changes, ChangeGroupRow, ChangeRow, RecordRow, Store};
use crate::error::StudioError;
use crate::ledger::ChangeLedger;
use crate::store::RecordStore;

/// Outcome of a record-scoped publish. "Nothing to publish" is a normal
/// result, not an error.
#[derive(Debug, Serialize)]
pub struct PublishReceipt {
    pub published: bool,
    pub message: Option<String>,
    pub group: Option<ChangeGroupRow>,
    pub committed: Vec<ChangeRow>,
}

/// A change skipped during a bulk commit, with its failure cause
#[derive(Debug, Clone, Serialize)]
pub struct SkippedChange {
    pub change_id: i64,
    pub description: String,
    pub reason: String,
}

/// Outcome of a bulk commit. The batch is best-effort: failures shrink
/// the committed list instead of aborting it.
#[derive(Debug, Serialize)]
pub struct BulkCommitReceipt {
    pub published: bool,
    pub message: Option<String>,
    pub group: Option<ChangeGroupRow>,
    pub committed: Vec<ChangeRow>,
    pub skipped: Vec<SkippedChange>,
}

/// Groups ledger commits into publish events
pub struct Publisher {
    ledger: ChangeLedger,
}

impl Publisher {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            ledger: ChangeLedger::new(store),
        }
    }

    fn store(&self) -> &RecordStore {
        self.ledger.record_store()
    }

    /// Publish a record: commit every pending change whose base or
    /// parent is this record, in staging order, and record the event.
    /// A single failure aborts the whole publish.
    pub fn publish(&self, record: &RecordRow, actor: &Actor) -> Result<PublishReceipt, StudioError> {
        let pending = self
            .store()
            .db(Store::Draft)
            .with_conn(|conn| changes::list_publishable(conn, &record.kind, &record.id))?;

        if pending.is_empty() {
            return Ok(PublishReceipt {
                published: false,
                message: Some("No changes made since last publish.".to_string()),
                group: None,
                committed: vec![],
            });
        }

        let committed = pending
            .iter()
            .map(|change| self.ledger.commit(change, true, false))
            .collect::<Result<Vec<_>, _>>()?;

        let description = format!(
            "{} published <{}> {}",
            actor.name,
            record.kind,
            record.display_name()
        );
        let change_ids: Vec<i64> = committed.iter().map(|c| c.id).collect();
        let group = self.store().db(Store::Draft).with_conn(|conn| {
            changes::insert_group(
                conn,
                &description,
                Some((record.kind.as_str(), record.id.as_str())),
                &actor.id,
                &change_ids,
            )
        })?;

        info!("{} ({} changes)", description, committed.len());
        Ok(PublishReceipt {
            published: true,
            message: None,
            group: Some(group),
            committed,
        })
    }

    /// Ids of the changes a publish event committed, for the audit trail
    pub fn group_change_ids(&self, group: &ChangeGroupRow) -> Result<Vec<i64>, StudioError> {
        self.store()
            .db(Store::Draft)
            .with_conn(|conn| changes::group_member_ids(conn, group.id))
    }

    /// Commit an explicit list of changes, e.g. everything a user staged
    /// this session. Per-change failures are logged and reported as
    /// skipped items; the rest of the batch proceeds.
    pub fn bulk_commit(
        &self,
        pending: &[ChangeRow],
        actor: &Actor,
    ) -> Result<BulkCommitReceipt, StudioError> {
        if pending.is_empty() {
            return Ok(BulkCommitReceipt {
                published: false,
                message: Some("No changes made since last bulk commit.".to_string()),
                group: None,
                committed: vec![],
                skipped: vec![],
            });
        }

        let mut committed = Vec::new();
        let mut skipped = Vec::new();
        for change in pending {
            match self.ledger.commit(change, true, false) {
                Ok(change) => committed.push(change),
                Err(e) => {
                    warn!("Skipping change {} ({}): {}", change.id, change.description, e);
                    skipped.push(SkippedChange {
                        change_id: change.id,
                        description: change.description.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let description = format!("{} published {} staged changes", actor.name, committed.len());
        let change_ids: Vec<i64> = committed.iter().map(|c| c.id).collect();
        let group = self
            .store()
            .db(Store::Draft)
            .with_conn(|conn| changes::insert_group(conn, &description, None, &actor.id, &change_ids))?;

        info!("{} ({} skipped)", description, skipped.len());
        Ok(BulkCommitReceipt {
            published: true,
            message: None,
            group: Some(group),
            committed,
            skipped,
        })
    }
}
