use super::*;
use crate::clipboard_history::dedup::compute_content_hash;

fn text_item(text: &str, captured_at: i64) -> ClipboardItem {
    let mut item = ClipboardItem::new(
        ContentKind::Text,
        compute_content_hash(text.as_bytes()),
        captured_at,
    );
    item.text = Some(text.to_string());
    item.byte_size = text.len() as i64;
    item
}

#[test]
fn test_insert_save_get_roundtrip() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    let mut item = text_item("hello", 1_700_000_000_000);
    item.source_app = Some(SourceApp {
        bundle_id: "com.apple.Safari".into(),
        name: "Safari".into(),
    });
    item.generation = 42;

    let id = store.insert(&item).unwrap();
    assert!(store.has_pending_changes(), "Insert opens a unit of work");
    assert_eq!(store.save().unwrap(), SaveOutcome::Committed);
    assert!(!store.has_pending_changes());

    let loaded = store.get(&id).unwrap().expect("item should exist");
    assert_eq!(loaded, item);
}

#[test]
fn test_duplicate_hash_is_conflict() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    store.insert(&text_item("hello", 1)).unwrap();
    store.save().unwrap();

    let err = store.insert(&text_item("hello", 2)).unwrap_err();
    assert!(err.is_conflict(), "Expected conflict, got {:?}", err);
    assert_eq!(store.save().unwrap(), SaveOutcome::Conflict);

    store.rollback();
    assert_eq!(store.count().unwrap(), 1, "Exactly one item per hash");
    assert_eq!(store.save().unwrap(), SaveOutcome::Committed, "Conflict cleared by rollback");
}

#[test]
fn test_conflict_rollback_discards_whole_unit() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    store.insert(&text_item("hello", 1)).unwrap();
    store.save().unwrap();

    store.insert(&text_item("other", 2)).unwrap();
    assert!(store.insert(&text_item("hello", 3)).is_err());
    store.rollback();

    assert_eq!(store.count().unwrap(), 1, "Rollback discards the unit");
}

#[test]
fn test_clear_conflict_keeps_rest_of_unit() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    store.insert(&text_item("hello", 1)).unwrap();
    store.save().unwrap();

    store.insert(&text_item("other", 2)).unwrap();
    assert!(store.insert(&text_item("hello", 3)).is_err());
    assert!(store.clear_conflict().is_some());
    assert_eq!(store.save().unwrap(), SaveOutcome::Committed);
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn test_insert_rejects_broken_invariant() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    let mut item = text_item("secret", 1);
    item.concealed = true;
    assert!(matches!(
        store.insert(&item),
        Err(StoreError::InvalidItem(_))
    ));
    assert!(!store.has_pending_changes());
}

#[test]
fn test_rollback_discards_uncommitted_insert() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    store.insert(&text_item("a", 1)).unwrap();
    store.rollback();
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_query_filters_sort_and_limit() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    for (i, text) in ["a", "b", "c", "d"].iter().enumerate() {
        store.insert(&text_item(text, (i as i64 + 1) * 1_000)).unwrap();
    }
    let mut concealed = text_item("pw", 5_000);
    concealed.concealed = true;
    concealed.expires_at = Some(65_000);
    store.insert(&concealed).unwrap();
    store.save().unwrap();

    let newest = store.query(&ItemQuery::all().limit(2)).unwrap();
    let texts: Vec<_> = newest.iter().filter_map(|i| i.text.as_deref()).collect();
    assert_eq!(texts, vec!["pw", "d"]);

    let oldest = store
        .query(&ItemQuery::all().sort(SortOrder::OldestFirst).limit(1))
        .unwrap();
    assert_eq!(oldest[0].text.as_deref(), Some("a"));

    let before = store.query(&ItemQuery::all().captured_before(3_000)).unwrap();
    assert_eq!(before.len(), 2, "captured_before is strict");

    let overdue = store
        .query(&ItemQuery::all().concealed(true).expires_at_or_before(65_000))
        .unwrap();
    assert_eq!(overdue.len(), 1);
    let not_yet = store
        .query(&ItemQuery::all().concealed(true).expires_at_or_before(64_999))
        .unwrap();
    assert!(not_yet.is_empty());
}

#[test]
fn test_latest_uses_insertion_order_for_ties() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    store.insert(&text_item("first", 1_000)).unwrap();
    store.insert(&text_item("second", 1_000)).unwrap();
    store.save().unwrap();

    assert_eq!(
        store.latest_content_hash().unwrap(),
        Some(compute_content_hash(b"second"))
    );
    assert_eq!(
        store.latest_item().unwrap().and_then(|i| i.text),
        Some("second".to_string())
    );
}

#[test]
fn test_update_and_delete() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    let item = text_item("hello", 1);
    store.insert(&item).unwrap();
    store.save().unwrap();

    let updated = store
        .update(&item.id, |i| i.title = Some("greeting".into()))
        .unwrap();
    assert_eq!(updated.title.as_deref(), Some("greeting"));
    store.save().unwrap();

    let missing = store.update(&ItemId::new(), |_| {});
    assert!(matches!(missing, Err(StoreError::NotFound(_))));

    let deleted = store.delete(&item.id).unwrap().expect("deleted item returned");
    assert_eq!(deleted.title.as_deref(), Some("greeting"));
    store.save().unwrap();
    assert!(store.get(&item.id).unwrap().is_none());
    assert!(store.delete(&item.id).unwrap().is_none(), "Second delete is a no-op");
}

#[test]
fn test_apply_enrichment_missing_item_is_noop() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    let enrichment = Enrichment {
        url_title: Some("Example".into()),
        ..Default::default()
    };
    assert!(!store.apply_enrichment(&ItemId::new(), &enrichment).unwrap());

    let item = text_item("https://example.com", 1);
    store.insert(&item).unwrap();
    assert!(store.apply_enrichment(&item.id, &enrichment).unwrap());
    store.save().unwrap();
    assert_eq!(
        store.get(&item.id).unwrap().unwrap().enrichment.url_title.as_deref(),
        Some("Example")
    );
}

#[test]
fn test_referenced_assets_and_clear_all() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    let mut image = ClipboardItem::new(ContentKind::Image, "imghash".into(), 1);
    image.image_asset = Some("a.img".into());
    image.thumbnail_asset = Some("a_thumb.img".into());
    store.insert(&image).unwrap();
    store.insert(&text_item("x", 2)).unwrap();
    store.save().unwrap();

    let assets = store.referenced_assets().unwrap();
    assert!(assets.contains("a.img") && assets.contains("a_thumb.img"));

    let mut released = store.clear_all().unwrap();
    released.sort();
    store.save().unwrap();
    assert_eq!(released, vec!["a.img".to_string(), "a_thumb.img".to_string()]);
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_on_disk_store_reopens_with_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db").join("history.sqlite");
    {
        let mut store = HistoryStore::open(&path).unwrap();
        store.insert(&text_item("persisted", 1)).unwrap();
        store.save().unwrap();
        store.run_maintenance(true).unwrap();
    }
    let store = HistoryStore::open(&path).unwrap();
    assert_eq!(store.count().unwrap(), 1);
    assert!(store
        .all_content_hashes()
        .unwrap()
        .contains(&compute_content_hash(b"persisted")));
}

#[test]
fn test_maintenance_skipped_inside_unit() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    store.insert(&text_item("x", 1)).unwrap();
    assert!(store.run_maintenance(true).is_ok());
    assert!(store.has_pending_changes(), "Maintenance must not end the unit");
}
