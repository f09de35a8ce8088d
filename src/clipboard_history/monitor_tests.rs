use super::*;
use crate::clipboard_history::blob_store::ImageLimits;
use crate::clipboard_history::clipboard::MemoryClipboard;
use crate::clipboard_history::database::ItemQuery;
use crate::clipboard_history::image::png_fixture;
use crate::clipboard_history::test_support::{
    FakePermissions, ManualClock, ManualScheduler, RecordingSurface, RecordingSynthesizer,
    StaticSourceApp,
};
use tempfile::TempDir;

const T0: i64 = 1_700_000_000_000;

struct Harness {
    engine: ClipboardEngine,
    clipboard: Arc<MemoryClipboard>,
    permissions: Arc<FakePermissions>,
    synthesizer: Arc<RecordingSynthesizer>,
    scheduler: Arc<ManualScheduler>,
    clock: Arc<ManualClock>,
    assets_dir: TempDir,
}

fn harness_with(store: HistoryStore, now_ms: i64) -> Harness {
    let assets_dir = TempDir::new().unwrap();
    let asset_store = ImageAssetStore::new(assets_dir.path(), ImageLimits::default()).unwrap();

    let clipboard = Arc::new(MemoryClipboard::new());
    let permissions = Arc::new(FakePermissions::granted());
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let scheduler = Arc::new(ManualScheduler::new());
    let clock = Arc::new(ManualClock::new(now_ms));

    let deps = EngineDeps {
        clipboard: clipboard.clone(),
        permissions: permissions.clone(),
        synthesizer: synthesizer.clone(),
        surface: Arc::new(RecordingSurface::default()),
        source_apps: Arc::new(StaticSourceApp(Some(SourceApp {
            bundle_id: "com.apple.TextEdit".into(),
            name: "TextEdit".into(),
        }))),
        scheduler: scheduler.clone(),
        clock: clock.clone(),
    };
    let engine = ClipboardEngine::new(EngineSettings::default(), store, asset_store, deps).unwrap();

    Harness {
        engine,
        clipboard,
        permissions,
        synthesizer,
        scheduler,
        clock,
        assets_dir,
    }
}

fn harness() -> Harness {
    harness_with(HistoryStore::open_in_memory().unwrap(), T0)
}

fn copy_and_poll(h: &mut Harness, text: &str) -> Option<CaptureOutcome> {
    h.clipboard.copy_text(text);
    h.engine.poll_tick()
}

fn paste(h: &mut Harness, id: &ItemId, mode: PasteMode) -> Result<PasteOutcome> {
    let (reply, outcome) = mpsc::sync_channel(1);
    h.engine.handle(EngineMessage::Paste {
        id: id.clone(),
        mode,
        plain: false,
        reply: Some(reply),
    });
    outcome.recv().unwrap()
}

fn stored_id(outcome: Option<CaptureOutcome>) -> ItemId {
    match outcome {
        Some(CaptureOutcome::Stored(id)) => id,
        other => panic!("Expected a stored item, got {:?}", other),
    }
}

#[test]
fn test_hello_hello_keeps_one_item() {
    let mut h = harness();

    stored_id(copy_and_poll(&mut h, "hello"));
    assert_eq!(copy_and_poll(&mut h, "hello"), Some(CaptureOutcome::Duplicate));

    let items = h.engine.store().query(&ItemQuery::all()).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text.as_deref(), Some("hello"));
}

#[test]
fn test_hello_world_hello_keeps_two_items() {
    let mut h = harness();

    stored_id(copy_and_poll(&mut h, "hello"));
    h.clock.advance(Duration::from_secs(1));
    stored_id(copy_and_poll(&mut h, "world"));
    h.clock.advance(Duration::from_secs(1));
    assert_eq!(
        copy_and_poll(&mut h, "hello"),
        Some(CaptureOutcome::Duplicate),
        "Repeat is caught by the unique hash, not the consecutive check"
    );

    assert_eq!(h.engine.store().count().unwrap(), 2);
}

#[test]
fn test_unchanged_generation_does_nothing() {
    let mut h = harness();
    stored_id(copy_and_poll(&mut h, "once"));
    assert_eq!(h.engine.poll_tick(), None);
}

#[test]
fn test_capture_records_metadata() {
    let mut h = harness();
    let id = stored_id(copy_and_poll(&mut h, "  padded  "));

    let item = h.engine.store().get(&id).unwrap().unwrap();
    assert_eq!(item.kind, ContentKind::Text);
    assert_eq!(item.captured_at, T0);
    assert_eq!(item.generation, h.clipboard.generation());
    assert_eq!(item.source_app.map(|app| app.name), Some("TextEdit".to_string()));
    assert!(item.byte_size > 0);
    assert!(!item.concealed);
    assert_eq!(item.expires_at, None);
}

#[test]
fn test_transient_content_is_rejected() {
    let mut h = harness();
    let mut snapshot = ClipboardSnapshot::text(0, "one-time code");
    snapshot.transient = true;
    h.clipboard.copy_external(snapshot);

    assert_eq!(
        h.engine.poll_tick(),
        Some(CaptureOutcome::Rejected(RejectReason::Transient))
    );
    assert_eq!(h.engine.store().count().unwrap(), 0);
}

#[test]
fn test_concealed_item_expires_at_capture_plus_ttl() {
    let mut h = harness();
    let mut snapshot = ClipboardSnapshot::text(0, "hunter2");
    snapshot.concealed = true;
    h.clipboard.copy_external(snapshot);

    let id = stored_id(h.engine.poll_tick());
    let item = h.engine.store().get(&id).unwrap().unwrap();
    assert!(item.concealed);
    assert_eq!(item.expires_at, Some(T0 + 60_000));
    assert_eq!(h.engine.pending_expiries(), 1);

    h.scheduler.advance(Duration::from_secs(59));
    h.engine.process_pending();
    assert!(h.engine.store().get(&id).unwrap().is_some(), "Still alive at 59s");

    h.clock.advance(Duration::from_secs(60));
    h.scheduler.advance(Duration::from_secs(1));
    h.engine.process_pending();
    assert!(h.engine.store().get(&id).unwrap().is_none(), "Gone at 60s");
    assert_eq!(h.engine.pending_expiries(), 0);
}

#[test]
fn test_clock_jump_between_polls_expires_concealed_item() {
    let mut h = harness();
    let mut snapshot = ClipboardSnapshot::text(0, "hunter2");
    snapshot.concealed = true;
    h.clipboard.copy_external(snapshot);
    let id = stored_id(h.engine.poll_tick());

    // Asleep: wall clock moves on, the monotonic timers do not.
    h.clock.advance(Duration::from_secs(61));
    assert_eq!(h.engine.poll_tick(), None, "Clipboard itself is unchanged");

    assert!(
        h.engine.store().get(&id).unwrap().is_none(),
        "Overdue item removed on the first tick after the jump"
    );
    assert_eq!(h.engine.pending_expiries(), 0);
}

#[test]
fn test_clock_jump_rearms_unexpired_items_against_wall_clock() {
    let mut h = harness();
    let mut snapshot = ClipboardSnapshot::text(0, "hunter2");
    snapshot.concealed = true;
    h.clipboard.copy_external(snapshot);
    let id = stored_id(h.engine.poll_tick());

    h.clock.advance(Duration::from_secs(40));
    h.engine.poll_tick();
    assert!(h.engine.store().get(&id).unwrap().is_some());
    assert_eq!(h.engine.pending_expiries(), 1);

    // 20s of wall time were left; the original 60s timer would be late.
    h.clock.advance(Duration::from_secs(20));
    h.scheduler.advance(Duration::from_secs(20));
    h.engine.process_pending();
    assert!(h.engine.store().get(&id).unwrap().is_none());
}

#[test]
fn test_regular_poll_gaps_do_not_resync() {
    let mut h = harness();
    let mut snapshot = ClipboardSnapshot::text(0, "hunter2");
    snapshot.concealed = true;
    h.clipboard.copy_external(snapshot);
    let id = stored_id(h.engine.poll_tick());

    for _ in 0..10 {
        h.clock.advance(DEFAULT_POLL_INTERVAL);
        h.engine.poll_tick();
    }
    assert!(h.engine.store().get(&id).unwrap().is_some());
    assert_eq!(h.engine.pending_expiries(), 1);
}

#[test]
fn test_restart_sweeps_overdue_concealed_items_first() {
    let mut store = HistoryStore::open_in_memory().unwrap();
    let mut item = ClipboardItem::new(ContentKind::Text, "secret-hash".into(), T0);
    item.text = Some("secret".into());
    item.concealed = true;
    item.expires_at = Some(T0 + 60_000);
    store.insert(&item).unwrap();
    store.save().unwrap();

    let mut h = harness_with(store, T0 + 120_000);
    h.engine.start();

    assert!(
        h.engine.store().get(&item.id).unwrap().is_none(),
        "Overdue concealed item removed during start"
    );
    assert_eq!(h.engine.pending_expiries(), 0);
}

#[test]
fn test_start_arms_poll_timer_with_tolerance() {
    let mut h = harness();
    h.engine.start();
    assert!(h.scheduler.tolerances().contains(&DEFAULT_POLL_TOLERANCE));

    h.clipboard.copy_text("from the timer");
    h.scheduler.advance(DEFAULT_POLL_INTERVAL);
    h.engine.process_pending();
    assert_eq!(h.engine.store().count().unwrap(), 1);

    h.engine.stop();
    h.clipboard.copy_text("after stop");
    h.scheduler.advance(DEFAULT_POLL_INTERVAL * 4);
    assert_eq!(h.engine.process_pending(), 0, "No ticks after stop");
}

#[test]
fn test_own_write_is_not_recaptured() {
    let mut h = harness();
    let id = stored_id(copy_and_poll(&mut h, "hello"));
    stored_id(copy_and_poll(&mut h, "world"));

    assert_eq!(paste(&mut h, &id, PasteMode::WriteOnly).unwrap(), PasteOutcome::Written);
    assert_eq!(h.engine.poll_tick(), None, "Our own write is suppressed");
    assert!(!h.engine.detector().is_suppression_armed());

    assert!(matches!(
        copy_and_poll(&mut h, "external"),
        Some(CaptureOutcome::Stored(_))
    ));
}

#[test]
fn test_external_write_after_ours_is_captured() {
    let mut h = harness();
    let id = stored_id(copy_and_poll(&mut h, "hello"));
    paste(&mut h, &id, PasteMode::WriteOnly).unwrap();

    // Another app overwrites the clipboard before the next poll.
    h.clipboard.copy_text("someone else");
    assert!(matches!(h.engine.poll_tick(), Some(CaptureOutcome::Stored(_))));
}

#[test]
fn test_paste_during_secure_input_never_synthesizes() {
    let mut h = harness();
    let id = stored_id(copy_and_poll(&mut h, "password"));
    let writes_before = h.clipboard.write_count();
    h.permissions.set_secure_input(true);

    let outcome = paste(&mut h, &id, PasteMode::WriteAndPaste).unwrap();
    h.scheduler.advance(Duration::from_secs(5));

    assert_eq!(outcome, PasteOutcome::WrittenSecureInput);
    assert_eq!(h.clipboard.write_count(), writes_before + 1);
    assert!(h.engine.detector().is_suppression_armed());
    assert_eq!(h.synthesizer.count(), 0);
}

#[test]
fn test_url_item_reads_back_as_url_and_text() {
    let mut h = harness();
    let id = stored_id(copy_and_poll(&mut h, "https://example.com/path"));
    assert_eq!(
        h.engine.store().get(&id).unwrap().unwrap().kind,
        ContentKind::Url
    );

    paste(&mut h, &id, PasteMode::WriteOnly).unwrap();
    let contents = h.clipboard.contents();
    assert_eq!(contents.url.as_deref(), Some("https://example.com/path"));
    assert_eq!(contents.text.as_deref(), Some("https://example.com/path"));
}

#[test]
fn test_paste_missing_item_is_an_error() {
    let mut h = harness();
    assert!(paste(&mut h, &ItemId::new(), PasteMode::WriteOnly).is_err());
    assert_eq!(h.clipboard.write_count(), 0);
}

#[test]
fn test_image_capture_and_paste_through_worker() {
    let mut h = harness();
    h.clipboard
        .copy_external(ClipboardSnapshot::image(0, png_fixture(32, 16)));

    assert_eq!(h.engine.poll_tick(), Some(CaptureOutcome::ImagePending));
    assert_eq!(h.engine.store().count().unwrap(), 0, "Not stored until assets exist");
    assert!(h.engine.pump(Duration::from_secs(10)) > 0);

    let items = h.engine.store().query(&ItemQuery::all()).unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.kind, ContentKind::Image);
    let full = item.image_asset.clone().expect("full asset");
    assert!(h.assets_dir.path().join(&full).exists());
    assert!(item.thumbnail_asset.is_some());

    let (reply, outcome) = mpsc::sync_channel(1);
    h.engine.handle(EngineMessage::Paste {
        id: item.id.clone(),
        mode: PasteMode::WriteOnly,
        plain: false,
        reply: Some(reply),
    });
    assert!(h.engine.pump(Duration::from_secs(10)) > 0);
    assert_eq!(outcome.recv().unwrap().unwrap(), PasteOutcome::Written);
    assert!(h.clipboard.contents().image.is_some());
}

fn pump_until(h: &mut Harness, messages: usize) {
    let mut handled = 0;
    while handled < messages {
        let n = h.engine.pump(Duration::from_secs(10));
        assert!(n > 0, "Timed out waiting for the asset worker");
        handled += n;
    }
}

#[test]
fn test_late_duplicate_image_releases_its_assets() {
    let mut h = harness();
    let png = png_fixture(24, 24);

    h.clipboard.copy_external(ClipboardSnapshot::image(0, png.clone()));
    assert_eq!(h.engine.poll_tick(), Some(CaptureOutcome::ImagePending));
    stored_id(copy_and_poll(&mut h, "between"));
    // "between" is the latest item, so the consecutive check lets this through.
    h.clipboard.copy_external(ClipboardSnapshot::image(0, png));
    assert_eq!(h.engine.poll_tick(), Some(CaptureOutcome::ImagePending));

    pump_until(&mut h, 2);

    let images = h
        .engine
        .store()
        .query(&ItemQuery::all().kind(ContentKind::Image))
        .unwrap();
    assert_eq!(images.len(), 1, "Second save hit the unique hash");
    assert_eq!(h.engine.store().count().unwrap(), 2);

    // Jobs run in order, so once this load completes the release has run.
    let (reply, outcome) = mpsc::sync_channel(1);
    h.engine.handle(EngineMessage::Paste {
        id: images[0].id.clone(),
        mode: PasteMode::WriteOnly,
        plain: false,
        reply: Some(reply),
    });
    pump_until(&mut h, 1);
    assert_eq!(outcome.recv().unwrap().unwrap(), PasteOutcome::Written);

    let mut files: Vec<String> = std::fs::read_dir(h.assets_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    let mut expected = images[0].asset_names();
    expected.sort();
    assert_eq!(files, expected, "Only the committed item's full image and thumbnail remain");
}

#[test]
fn test_undecodable_image_is_dropped() {
    let mut h = harness();
    h.clipboard
        .copy_external(ClipboardSnapshot::image(0, b"definitely not an image".to_vec()));

    assert_eq!(h.engine.poll_tick(), Some(CaptureOutcome::ImagePending));
    h.engine.pump(Duration::from_secs(10));
    assert_eq!(h.engine.store().count().unwrap(), 0);
}

#[test]
fn test_late_image_load_for_deleted_item() {
    let mut h = harness();
    h.clipboard
        .copy_external(ClipboardSnapshot::image(0, png_fixture(8, 8)));
    h.engine.poll_tick();
    h.engine.pump(Duration::from_secs(10));
    let id = h.engine.store().latest_item().unwrap().unwrap().id;

    let (reply, outcome) = mpsc::sync_channel(1);
    h.engine.handle(EngineMessage::Paste {
        id: id.clone(),
        mode: PasteMode::WriteOnly,
        plain: false,
        reply: Some(reply),
    });
    assert!(h.engine.delete_item(&id).unwrap());
    h.engine.pump(Duration::from_secs(10));

    assert!(outcome.recv().unwrap().is_err(), "Vanished item is reported, not pasted");
}

#[test]
fn test_enrich_message_updates_item() {
    let mut h = harness();
    let id = stored_id(copy_and_poll(&mut h, "fn main() {}"));

    let sender = h.engine.sender();
    sender
        .send(EngineMessage::Enrich {
            id: id.clone(),
            enrichment: Enrichment {
                detected_language: Some("rust".into()),
                ..Default::default()
            },
        })
        .unwrap();
    sender
        .send(EngineMessage::Enrich {
            id: ItemId::new(),
            enrichment: Enrichment {
                url_title: Some("ignored".into()),
                ..Default::default()
            },
        })
        .unwrap();
    assert_eq!(h.engine.process_pending(), 2);

    let item = h.engine.store().get(&id).unwrap().unwrap();
    assert_eq!(item.enrichment.detected_language.as_deref(), Some("rust"));
}

#[test]
fn test_delete_message_replies() {
    let mut h = harness();
    let id = stored_id(copy_and_poll(&mut h, "bye"));

    let (reply, outcome) = mpsc::sync_channel(1);
    h.engine.handle(EngineMessage::Delete {
        id: id.clone(),
        reply: Some(reply),
    });
    assert!(outcome.recv().unwrap().unwrap());
    assert_eq!(h.engine.store().count().unwrap(), 0);
}

#[test]
fn test_shutdown_message_stops_handling() {
    let mut h = harness();
    assert!(h.engine.handle(EngineMessage::PollTick));
    assert!(!h.engine.handle(EngineMessage::Shutdown));
}

#[test]
fn test_spawned_engine_round_trip() {
    let h = harness();
    let clipboard = h.clipboard.clone();
    let mut handle = h.engine.spawn().unwrap();

    clipboard.copy_text("threaded");
    handle.send(EngineMessage::PollTick).unwrap();
    handle.wake().unwrap();
    handle.shutdown();
    assert!(
        handle.send(EngineMessage::PollTick).is_err(),
        "Engine is gone after shutdown"
    );
}
