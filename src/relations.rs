//! Relationship map codec
//!
//! Every record carries a normalized JSON map describing the state of its
//! relational fields. Single links hold an optional id, owned to-many
//! fields hold an id list, and many-to-many fields split into `rels`
//! (reciprocal relationships, mirrored on the linked record) and `refs`
//! (one-directional citations).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::{FieldKind, RecordSchema};

/// Which side of a many-to-many entry a link lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelLevel {
    /// Reciprocal relationship, mirrored on the linked record
    Rels,
    /// One-directional citation
    Refs,
}

impl RelLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelLevel::Rels => "rels",
            RelLevel::Refs => "refs",
        }
    }
}

/// State of one relational field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelEntry {
    Single {
        id: Option<String>,
    },
    ToMany {
        ids: Vec<String>,
    },
    ManyToMany {
        rels: Vec<String>,
        refs: Vec<String>,
    },
}

impl RelEntry {
    /// Whether the entry references the given id anywhere
    pub fn contains(&self, id: &str) -> bool {
        match self {
            RelEntry::Single { id: current } => current.as_deref() == Some(id),
            RelEntry::ToMany { ids } => ids.iter().any(|i| i == id),
            RelEntry::ManyToMany { rels, refs } => {
                rels.iter().any(|i| i == id) || refs.iter().any(|i| i == id)
            }
        }
    }
}

/// Relationship map keyed by field name, serialized into `rel_map_json`
pub type RelMap = BTreeMap<String, RelEntry>;

/// Default entry for a declared relational field
pub fn default_entry(kind: &FieldKind) -> Option<RelEntry> {
    match kind {
        FieldKind::SingleLink { .. } => Some(RelEntry::Single { id: None }),
        FieldKind::ToMany => Some(RelEntry::ToMany { ids: vec![] }),
        FieldKind::ManyToMany => Some(RelEntry::ManyToMany {
            rels: vec![],
            refs: vec![],
        }),
        FieldKind::Value { .. } | FieldKind::Media => None,
    }
}

/// Build the default relationship map for a record kind.
/// Media fields are tracked separately and get no entry.
pub fn default_map(schema: &RecordSchema) -> RelMap {
    schema
        .fields
        .iter()
        .filter_map(|f| default_entry(&f.kind).map(|entry| (f.name.clone(), entry)))
        .collect()
}

pub(crate) fn dedup(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// De-duplicate every id list in the map. Concurrent requests can append
/// the same id twice before either save lands; flattening collapses the
/// duplicates. Idempotent.
pub fn flatten(map: &RelMap) -> RelMap {
    map.iter()
        .map(|(name, entry)| {
            let flattened = match entry {
                RelEntry::Single { id } => RelEntry::Single { id: id.clone() },
                RelEntry::ToMany { ids } => RelEntry::ToMany { ids: dedup(ids) },
                RelEntry::ManyToMany { rels, refs } => RelEntry::ManyToMany {
                    rels: dedup(rels),
                    refs: dedup(refs),
                },
            };
            (name.clone(), flattened)
        })
        .collect()
}

/// Reconcile a stored map against the kind's current field list: new
/// fields get default entries, entries for removed fields are dropped,
/// surviving entries are left untouched.
pub fn migrate(map: &RelMap, schema: &RecordSchema) -> RelMap {
    let mut migrated = RelMap::new();
    for field in schema.relational_fields() {
        let entry = map
            .get(&field.name)
            .cloned()
            .or_else(|| default_entry(&field.kind));
        if let Some(entry) = entry {
            migrated.insert(field.name.clone(), entry);
        }
    }
    migrated
}

/// Whether a stored map already matches the kind's current field list
pub fn matches_schema(map: &RelMap, schema: &RecordSchema) -> bool {
    let declared: Vec<&str> = schema.relational_fields().map(|f| f.name.as_str()).collect();
    let stored: Vec<&str> = map.keys().map(String::as_str).collect();
    let mut declared_sorted = declared;
    declared_sorted.sort_unstable();
    declared_sorted == stored
}

/// Append an id into a many-to-many entry at the given level
pub(crate) fn add_many(entry: &mut RelEntry, id: &str, level: RelLevel) {
    if let RelEntry::ManyToMany { rels, refs } = entry {
        match level {
            RelLevel::Rels => rels.push(id.to_string()),
            RelLevel::Refs => refs.push(id.to_string()),
        }
    }
}

/// Remove an id from wherever the entry holds it. Returns whether
/// anything changed; removing an absent id is a no-op, not an error.
pub(crate) fn remove_id(entry: &mut RelEntry, id: &str) -> bool {
    match entry {
        RelEntry::Single { id: current } => {
            if current.as_deref() == Some(id) {
                *current = None;
                true
            } else {
                false
            }
        }
        RelEntry::ToMany { ids } => {
            let before = ids.len();
            ids.retain(|i| i != id);
            ids.len() != before
        }
        RelEntry::ManyToMany { rels, refs } => {
            let before = rels.len() + refs.len();
            rels.retain(|i| i != id);
            refs.retain(|i| i != id);
            rels.len() + refs.len() != before
        }
    }
}
