//! Publish-side tests: commit projection into the live store, ordered
//! commits, publish grouping, best-effort bulk commits and index sync.

mod common;

use serde_json::json;
use studio_storage::{ChangeLedger, Publisher, RelEntry, RelLevel, Store, StudioError};

use common::{create_record, editor, set_title, setup};

#[test]
fn test_commit_projects_into_live_store() {
    let (store, index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    let mut article = create_record(&store, "article", "Original");
    ledger.stage_created(&article, &editor(), None).unwrap();

    set_title(&store, &mut article, "X");
    ledger.stage_updated(&article, &editor(), None).unwrap();

    let committed = ledger.commit_for_record(&article).unwrap();
    assert_eq!(committed.len(), 2);
    assert!(committed.iter().all(|c| c.committed && c.committed_at.is_some()));

    // Commits land in staging order, so the live copy carries the last
    // staged title
    let live = store.get("article", &article.id, Store::Live).unwrap();
    assert!(live.tracked);
    assert_eq!(live.fields["title"], json!("X"));

    // The draft base is flagged as published
    let base = store.get("article", &article.id, Store::Draft).unwrap();
    assert!(base.published);
    assert!(base.last_published_at.is_some());

    // The live document reached the index under the live namespace
    let doc = index.fetch(Store::Live, "article", &article.id).unwrap();
    assert_eq!(doc.fields["title"], json!("X"));
    assert!(index.fetch(Store::Draft, "article", &article.id).is_none());
}

#[test]
fn test_commit_drops_single_links_keeps_owner() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    let mut article = create_record(&store, "article", "Linked");
    let mut profile = create_record(&store, "profile", "Author");
    let mut topic = create_record(&store, "topic", "Kept");
    store.set_single_link(&mut article, "profile", &mut profile).unwrap();
    store
        .add_relation(&mut article, "topics", &mut topic, RelLevel::Rels)
        .unwrap();

    ledger.stage_updated(&article, &editor(), None).unwrap();
    let change = &ledger.changes_for_record(&article, false).unwrap()[0];
    // Project the base's current state so the live row carries the maps
    ledger.commit(change, true, true).unwrap();

    let live = store.get("article", &article.id, Store::Live).unwrap();
    assert_eq!(live.rel_map.get("profile"), Some(&RelEntry::Single { id: None }));
    assert!(live.rel_map["topics"].contains(&topic.id));
    assert_eq!(live.owner.as_deref(), Some("user-1"));
}

#[test]
fn test_commit_denormalizes_structured_fields() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    let mut article = create_record(&store, "article", "Stats");
    article.fields.insert(
        "statistics".to_string(),
        json!({
            "sub_instances": [
                {"fields": [{"name": "icon", "value": "star"}, {"name": "value", "value": "10"}]}
            ]
        }),
    );
    store.save(&article, Store::Draft, true).unwrap();

    ledger.stage_updated(&article, &editor(), None).unwrap();
    ledger.commit_for_record(&article).unwrap();

    let live = store.get("article", &article.id, Store::Live).unwrap();
    assert_eq!(live.fields["statistics"], json!([{"icon": "star", "value": "10"}]));
}

#[test]
fn test_commit_deleted_is_a_store_noop() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    let mut article = create_record(&store, "article", "Going Away");
    store.soft_delete(&mut article, Store::Draft).unwrap();
    ledger.stage_deleted(&article, &editor(), None).unwrap();

    let committed = ledger.commit_for_record(&article).unwrap();
    assert_eq!(committed.len(), 1);
    assert!(committed[0].committed);

    // Nothing was projected
    assert!(store.try_get("article", &article.id, Store::Live).unwrap().is_none());
}

#[test]
fn test_publish_noop_is_not_an_error() {
    let (store, _index) = setup();
    let publisher = Publisher::new(store.clone());

    let article = create_record(&store, "article", "Untouched");
    let receipt = publisher.publish(&article, &editor()).unwrap();

    assert!(!receipt.published);
    assert_eq!(
        receipt.message.as_deref(),
        Some("No changes made since last publish.")
    );
    assert!(receipt.group.is_none());
    assert!(receipt.committed.is_empty());
}

#[test]
fn test_publish_covers_record_and_children() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());
    let publisher = Publisher::new(store.clone());

    let article = create_record(&store, "article", "Parent");
    ledger.stage_created(&article, &editor(), None).unwrap();

    let section = create_record(&store, "section", "Child");
    ledger
        .stage_created(&section, &editor(), Some(&article))
        .unwrap();

    let receipt = publisher.publish(&article, &editor()).unwrap();
    assert!(receipt.published);
    assert_eq!(receipt.committed.len(), 2);
    // Staging order is preserved
    assert_eq!(receipt.committed[0].base_id, article.id);
    assert_eq!(receipt.committed[1].base_id, section.id);

    let group = receipt.group.unwrap();
    assert_eq!(group.scope_kind.as_deref(), Some("article"));
    assert_eq!(group.scope_id.as_deref(), Some(article.id.as_str()));
    assert_eq!(
        publisher.group_change_ids(&group).unwrap(),
        receipt.committed.iter().map(|c| c.id).collect::<Vec<_>>()
    );

    // Both records reached the live store
    assert!(store.try_get("article", &article.id, Store::Live).unwrap().is_some());
    assert!(store.try_get("section", &section.id, Store::Live).unwrap().is_some());

    // A second publish has nothing left to do
    let receipt = publisher.publish(&article, &editor()).unwrap();
    assert!(!receipt.published);
}

#[test]
fn test_bulk_commit_is_best_effort() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());
    let publisher = Publisher::new(store.clone());

    let first = create_record(&store, "topic", "First");
    let broken = create_record(&store, "topic", "Broken");
    let third = create_record(&store, "topic", "Third");
    for record in [&first, &broken, &third] {
        ledger.stage_created(record, &editor(), None).unwrap();
    }

    let mut pending = Vec::new();
    for record in [&first, &broken, &third] {
        pending.extend(ledger.changes_for_record(record, false).unwrap());
    }
    assert_eq!(pending.len(), 3);

    // Break the middle change: its copy snapshot disappears out from
    // under it
    let broken_change = &pending[1];
    let snapshot = store
        .try_get("topic", &broken_change.object_id, Store::Draft)
        .unwrap()
        .unwrap();
    store.hard_delete(&snapshot, Store::Draft).unwrap();

    let receipt = publisher.bulk_commit(&pending, &editor()).unwrap();
    assert!(receipt.published);
    assert_eq!(receipt.committed.len(), 2);
    assert_eq!(receipt.skipped.len(), 1);
    assert_eq!(receipt.skipped[0].change_id, broken_change.id);
    assert!(!receipt.skipped[0].reason.is_empty());

    // The healthy records still landed
    assert!(store.try_get("topic", &first.id, Store::Live).unwrap().is_some());
    assert!(store.try_get("topic", &third.id, Store::Live).unwrap().is_some());
    assert!(store.try_get("topic", &broken.id, Store::Live).unwrap().is_none());

    // An empty batch is a normal, non-published outcome
    let receipt = publisher.bulk_commit(&[], &editor()).unwrap();
    assert!(!receipt.published);
    assert!(receipt.message.is_some());
}

#[test]
fn test_index_respects_flags_and_stores() {
    let (store, index) = setup();

    let mut article = create_record(&store, "article", "Indexing");

    // Draft saves never reach the index
    store.save(&article, Store::Draft, true).unwrap();
    assert_eq!(index.count(Store::Draft, "article"), 0);
    assert_eq!(index.count(Store::Live, "article"), 0);

    // A suppressed live save stays out of the index
    store.save(&article, Store::Live, false).unwrap();
    assert_eq!(index.count(Store::Live, "article"), 0);

    // An untracked record is not indexed
    article.tracked = false;
    store.save(&article, Store::Live, true).unwrap();
    assert_eq!(index.count(Store::Live, "article"), 0);

    // A tracked live save is
    article.tracked = true;
    store.save(&article, Store::Live, true).unwrap();
    assert_eq!(index.count(Store::Live, "article"), 1);

    // Hard deleting removes the document
    store.hard_delete(&article, Store::Live).unwrap();
    assert_eq!(index.count(Store::Live, "article"), 0);
}

#[test]
fn test_changes_for_kind_filters_by_actor() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    let eva = editor();
    let other = studio_storage::Actor::new("user-2", "omar");

    let first = create_record(&store, "topic", "Eva's");
    let second = create_record(&store, "topic", "Omar's");
    ledger.stage_created(&first, &eva, None).unwrap();
    ledger.stage_created(&second, &other, None).unwrap();

    let evas = ledger.changes_for_kind("topic", &eva, false).unwrap();
    assert_eq!(evas.len(), 1);
    assert_eq!(evas[0].base_id, first.id);
}

#[test]
fn test_revert_is_unsupported() {
    let (store, _index) = setup();
    let ledger = ChangeLedger::new(store.clone());

    let article = create_record(&store, "article", "No Undo");
    ledger.stage_created(&article, &editor(), None).unwrap();
    let change = &ledger.changes_for_record(&article, false).unwrap()[0];

    assert!(matches!(
        ledger.revert(change),
        Err(StudioError::RevertUnsupported)
    ));
}
