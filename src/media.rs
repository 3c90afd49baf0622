//! Media order tracking
//!
//! Each record keeps one ordered id list per declared media kind
//! ("images", "videos", ...). Index 0 is the primary item. The order is
//! created empty alongside the record and dies with it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StudioError;
use crate::registry::RecordSchema;

/// Ordered media id lists keyed by media kind, serialized into
/// `media_order_json`
pub type MediaOrder = BTreeMap<String, Vec<String>>;

/// A drag-and-drop reorder: remove the element at `source_index`, insert
/// `id` at `destination_index`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMove {
    pub source_index: usize,
    pub destination_index: usize,
    pub id: String,
}

/// Empty order lists for every media kind the schema declares
pub fn default_order(schema: &RecordSchema) -> MediaOrder {
    schema
        .media_kinds()
        .map(|kind| (kind.to_string(), vec![]))
        .collect()
}

fn entry<'a>(
    order: &'a MediaOrder,
    record_kind: &str,
    media_kind: &str,
) -> Result<&'a Vec<String>, StudioError> {
    order
        .get(media_kind)
        .ok_or_else(|| StudioError::UnknownMediaKind {
            kind: record_kind.to_string(),
            media_kind: media_kind.to_string(),
        })
}

/// Read an order list, dropping stale empty entries
pub fn get_order(
    order: &MediaOrder,
    record_kind: &str,
    media_kind: &str,
) -> Result<Vec<String>, StudioError> {
    let ids = entry(order, record_kind, media_kind)?;
    Ok(ids.iter().filter(|id| !id.is_empty()).cloned().collect())
}

/// Replace an order list wholesale
pub fn set_order(
    order: &mut MediaOrder,
    record_kind: &str,
    media_kind: &str,
    ids: Vec<String>,
) -> Result<(), StudioError> {
    entry(order, record_kind, media_kind)?;
    order.insert(media_kind.to_string(), ids);
    Ok(())
}

/// Append an id to the end of an order list
pub fn extend_order(
    order: &mut MediaOrder,
    record_kind: &str,
    media_kind: &str,
    id: &str,
) -> Result<(), StudioError> {
    let mut ids = get_order(order, record_kind, media_kind)?;
    ids.push(id.to_string());
    set_order(order, record_kind, media_kind, ids)
}

/// Remove an id from an order list. Unlike relation removal this is an
/// error when the id is absent: the caller believed the media was
/// attached.
pub fn reduce_order(
    order: &mut MediaOrder,
    record_kind: &str,
    media_kind: &str,
    id: &str,
) -> Result<(), StudioError> {
    let mut ids = get_order(order, record_kind, media_kind)?;
    let position = ids.iter().position(|i| i == id).ok_or_else(|| {
        StudioError::MediaNotAttached {
            media_kind: media_kind.to_string(),
            id: id.to_string(),
        }
    })?;
    ids.remove(position);
    set_order(order, record_kind, media_kind, ids)
}

/// Apply a drag-and-drop move to an order list
pub fn update_order(
    order: &mut MediaOrder,
    record_kind: &str,
    media_kind: &str,
    mv: &MediaMove,
) -> Result<(), StudioError> {
    let mut ids = get_order(order, record_kind, media_kind)?;
    if mv.source_index >= ids.len() {
        return Err(StudioError::OrderIndexOutOfBounds {
            media_kind: media_kind.to_string(),
            index: mv.source_index,
        });
    }
    ids.remove(mv.source_index);
    let destination = mv.destination_index.min(ids.len());
    ids.insert(destination, mv.id.clone());
    set_order(order, record_kind, media_kind, ids)
}
