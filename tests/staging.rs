//! Staging-side tests: copy-on-write snapshots, relationship
//! bookkeeping, media orders and the schema-evolution sweep.

mod common;

use serde_json::json;
use studio_storage::maintenance::migrate_rel_maps;
use studio_storage::{
    Actor, ChangeLedger, MediaMove, RelEntry, RelLevel, StageType, Store, StudioError,
};

use common::{create_record, editor, setup};

#[test]
fn test_snapshot_isolation() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    let article = create_record(&store, "article", "Snapshot Isolation");
    let base = ledger.stage_updated(&article, &editor(), None).unwrap();
    assert_eq!(base.id, article.id);

    let changes = ledger.changes_for_record(&article, false).unwrap();
    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_eq!(change.base_id, article.id);
    assert_ne!(change.object_id, article.id);

    let copy = store
        .try_get("article", &change.object_id, Store::Draft)
        .unwrap()
        .unwrap();
    assert!(!copy.tracked);
    // Non-unique values are carried over verbatim
    assert_eq!(copy.fields["title"], json!("Snapshot Isolation"));
    // Unique values are disambiguated so the copy never collides
    let copy_slug = copy.fields["slug"].as_str().unwrap();
    assert_ne!(copy_slug, "snapshot-isolation");
    assert!(copy_slug.starts_with("snapshot-isolation-"));
    // Single links are never duplicated
    assert_eq!(copy.rel_map.get("profile"), Some(&RelEntry::Single { id: None }));
}

#[test]
fn test_stage_unknown_kind_fails() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    let mut record = create_record(&store, "article", "Wrong Kind");
    record.kind = "unregistered".to_string();

    assert!(matches!(
        ledger.stage_created(&record, &editor(), None),
        Err(StudioError::UnknownKind(_))
    ));
}

#[test]
fn test_stage_snapshots_link_state() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    let mut article = create_record(&store, "article", "Linked");
    let mut topic = create_record(&store, "topic", "Economy");
    let mut profile = create_record(&store, "profile", "Author Profile");

    store
        .add_relation(&mut article, "topics", &mut topic, RelLevel::Rels)
        .unwrap();
    store.set_single_link(&mut article, "profile", &mut profile).unwrap();

    ledger.stage_updated(&article, &editor(), None).unwrap();
    let change = &ledger.changes_for_record(&article, false).unwrap()[0];

    assert_eq!(change.single_links.get("profile"), Some(&profile.id));
    assert_eq!(change.many_to_many.get("topics"), Some(&vec![topic.id.clone()]));
}

#[test]
fn test_reciprocal_relation_bookkeeping() {
    let (store, _index) = setup();

    let mut article = create_record(&store, "article", "Reciprocal");
    let mut topic = create_record(&store, "topic", "Justice");

    store
        .add_relation(&mut article, "topics", &mut topic, RelLevel::Rels)
        .unwrap();

    // Both sides hold the link, in the store as well as in memory
    let article_db = store.get("article", &article.id, Store::Draft).unwrap();
    let topic_db = store.get("topic", &topic.id, Store::Draft).unwrap();
    assert!(article_db.rel_map["topics"].contains(&topic.id));
    assert!(topic_db.rel_map["articles"].contains(&article.id));

    store.remove_relation(&mut article, "topics", &mut topic).unwrap();

    let article_db = store.get("article", &article.id, Store::Draft).unwrap();
    let topic_db = store.get("topic", &topic.id, Store::Draft).unwrap();
    assert!(!article_db.rel_map["topics"].contains(&topic.id));
    assert!(!topic_db.rel_map["articles"].contains(&article.id));

    // Removing an absent relation is a no-op, not an error
    store.remove_relation(&mut article, "topics", &mut topic).unwrap();
}

#[test]
fn test_refs_are_one_directional() {
    let (store, _index) = setup();

    let mut article = create_record(&store, "article", "Citing");
    let mut topic = create_record(&store, "topic", "Cited");

    store
        .add_relation(&mut article, "topics", &mut topic, RelLevel::Refs)
        .unwrap();

    let article_db = store.get("article", &article.id, Store::Draft).unwrap();
    let topic_db = store.get("topic", &topic.id, Store::Draft).unwrap();
    match &article_db.rel_map["topics"] {
        RelEntry::ManyToMany { rels, refs } => {
            assert!(rels.is_empty());
            assert_eq!(refs, &vec![topic.id.clone()]);
        }
        other => panic!("unexpected entry: {:?}", other),
    }
    assert!(!topic_db.rel_map["articles"].contains(&article.id));
}

#[test]
fn test_double_add_collapses() {
    let (store, _index) = setup();

    let mut article = create_record(&store, "article", "Double");
    let mut topic = create_record(&store, "topic", "Once");

    store
        .add_relation(&mut article, "topics", &mut topic, RelLevel::Rels)
        .unwrap();
    store
        .add_relation(&mut article, "topics", &mut topic, RelLevel::Rels)
        .unwrap();

    let article_db = store.get("article", &article.id, Store::Draft).unwrap();
    match &article_db.rel_map["topics"] {
        RelEntry::ManyToMany { rels, .. } => assert_eq!(rels, &vec![topic.id.clone()]),
        other => panic!("unexpected entry: {:?}", other),
    }
}

#[test]
fn test_owned_children() {
    let (store, _index) = setup();

    let mut article = create_record(&store, "article", "Parent");
    let section = create_record(&store, "section", "Intro");

    store.attach_child(&mut article, "sections", &section).unwrap();
    let article_db = store.get("article", &article.id, Store::Draft).unwrap();
    assert!(article_db.rel_map["sections"].contains(&section.id));

    store.detach_child(&mut article, "sections", &section).unwrap();
    let article_db = store.get("article", &article.id, Store::Draft).unwrap();
    assert!(!article_db.rel_map["sections"].contains(&section.id));
}

#[test]
fn test_media_order_operations_persist() {
    let (store, _index) = setup();

    let mut article = create_record(&store, "article", "Gallery");
    for id in ["5", "6", "7"] {
        store.extend_order(&mut article, "images", id).unwrap();
    }

    store
        .update_order(
            &mut article,
            "images",
            &MediaMove {
                source_index: 0,
                destination_index: 2,
                id: "5".to_string(),
            },
        )
        .unwrap();

    let reloaded = store.get("article", &article.id, Store::Draft).unwrap();
    assert_eq!(store.get_order(&reloaded, "images").unwrap(), vec!["6", "7", "5"]);

    // Other media kinds stay untouched
    assert_eq!(store.get_order(&reloaded, "videos").unwrap(), Vec::<String>::new());

    store.reduce_order(&mut article, "images", "6").unwrap();
    assert!(matches!(
        store.reduce_order(&mut article, "images", "6"),
        Err(StudioError::MediaNotAttached { .. })
    ));
}

#[test]
fn test_soft_delete_is_draft_only() {
    let (store, _index) = setup();

    let mut article = create_record(&store, "article", "Fake Delete");
    assert!(matches!(
        store.soft_delete(&mut article, Store::Live),
        Err(StudioError::SoftDeleteOutsideDraft)
    ));

    store.soft_delete(&mut article, Store::Draft).unwrap();
    let reloaded = store.get("article", &article.id, Store::Draft).unwrap();
    assert!(!reloaded.tracked);
}

#[test]
fn test_bulk_stage_returns_base_records() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    let records = vec![
        create_record(&store, "topic", "One"),
        create_record(&store, "topic", "Two"),
    ];
    let bases = ledger.bulk_stage_created(&records, &editor(), None).unwrap();

    assert_eq!(
        bases.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>()
    );
    for record in &records {
        assert_eq!(ledger.changes_for_record(record, false).unwrap().len(), 1);
    }
}

#[test]
fn test_migrate_rel_maps_reconciles_legacy_rows() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    // Simulate rows written before the current field list existed
    let mut stale = create_record(&store, "article", "Legacy");
    stale.rel_map.remove("topics");
    stale.rel_map.insert(
        "retired_field".to_string(),
        RelEntry::ToMany { ids: vec!["x".to_string()] },
    );
    store.save(&stale, Store::Draft, true).unwrap();

    let current = create_record(&store, "article", "Current");

    let bot = Actor::system("migration");
    let report = migrate_rel_maps(&ledger, "article", &bot, false).unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.migrated, 1);
    assert_eq!(report.staged, 1);

    let reconciled = store.get("article", &stale.id, Store::Draft).unwrap();
    assert!(reconciled.rel_map.contains_key("topics"));
    assert!(!reconciled.rel_map.contains_key("retired_field"));

    // Only the reconciled record was staged, under the system actor
    let staged = ledger.changes_for_record(&stale, false).unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].stage_type, StageType::Updated);
    assert_eq!(staged[0].actor.as_deref(), Some("system:migration"));
    assert!(ledger.changes_for_record(&current, false).unwrap().is_empty());
}
