//! Shared fixtures: an in-memory store pair with a small content schema.

use std::sync::Arc;

use serde_json::json;
use studio_storage::{
    Actor, FieldDef, InMemoryIndex, NewRecord, RecordRow, RecordSchema, RecordStore,
    SchemaRegistry, Store,
};

/// Fixture kinds: articles link topics (reciprocal) and profiles
/// (one-to-one), own sections, and carry image/video media.
pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.register(RecordSchema::new(
        "article",
        "articles",
        vec![
            FieldDef::value("title"),
            FieldDef::unique_value("slug"),
            FieldDef::single_link("profile", Some("article")),
            FieldDef::to_many("sections"),
            FieldDef::many_to_many("topics"),
            FieldDef::media("images"),
            FieldDef::media("videos"),
        ],
    ));
    registry.register(RecordSchema::new(
        "topic",
        "topics",
        vec![FieldDef::value("title"), FieldDef::many_to_many("articles")],
    ));
    registry.register(RecordSchema::new(
        "profile",
        "profiles",
        vec![
            FieldDef::value("title"),
            FieldDef::single_link("article", Some("profile")),
        ],
    ));
    registry.register(RecordSchema::new(
        "section",
        "sections",
        vec![FieldDef::value("title")],
    ));
    registry
}

/// In-memory draft/live stores sharing an inspectable index
pub fn setup() -> (Arc<RecordStore>, Arc<InMemoryIndex>) {
    let index = Arc::new(InMemoryIndex::new());
    let store = RecordStore::open_in_memory(registry(), index.clone()).unwrap();
    (Arc::new(store), index)
}

pub fn editor() -> Actor {
    Actor::new("user-1", "eva")
}

/// Create a draft record with a title (and a slug for articles)
pub fn create_record(store: &RecordStore, kind: &str, title: &str) -> RecordRow {
    let mut fields = serde_json::Map::new();
    fields.insert("title".to_string(), json!(title));
    if kind == "article" {
        fields.insert(
            "slug".to_string(),
            json!(title.to_lowercase().replace(' ', "-")),
        );
    }

    store
        .create(
            NewRecord {
                id: None,
                kind: kind.to_string(),
                owner: Some("user-1".to_string()),
                fields,
            },
            Store::Draft,
        )
        .unwrap()
}

/// Overwrite a record's title in the draft store
pub fn set_title(store: &RecordStore, record: &mut RecordRow, title: &str) {
    record.fields.insert("title".to_string(), json!(title));
    store.save(record, Store::Draft, true).unwrap();
}
