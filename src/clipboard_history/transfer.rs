//! History export and import
//!
//! A single versioned JSON document. Concealed and image items are never
//! exported. Import checks the version before touching the store, creates
//! missing labels by name, skips content already present and commits in
//! batches.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use super::database::{HistoryStore, ItemQuery, SaveOutcome, SortOrder};
use super::dedup::{canonical_bytes, compute_content_hash};
use super::types::{ClipboardItem, ContentKind, Enrichment, LabelId, LabelSpec, SourceApp};
use crate::error::{StoreError, TransferError};

pub const EXPORT_VERSION: u64 = 1;

/// Records inserted per committed unit of work during import.
pub const IMPORT_BATCH_SIZE: usize = 50;

/// Color given to labels that only appear on items.
const FALLBACK_LABEL_COLOR: &str = "gray";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: u64,
    pub exported_at: DateTime<Utc>,
    pub items: Vec<ExportedItem>,
    #[serde(default)]
    pub labels: Vec<ExportedLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedItem {
    pub kind: ContentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_rtf",
        deserialize_with = "deserialize_rtf"
    )]
    pub rtf: Option<Vec<u8>>,
    pub captured_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_app: Option<SourceApp>,
    #[serde(default)]
    pub byte_size: i64,
    #[serde(default)]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Enrichment::is_empty")]
    pub enrichment: Enrichment,
    /// Label names.
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedLabel {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub labels_created: usize,
}

fn serialize_rtf<S: Serializer>(rtf: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match rtf {
        Some(bytes) => {
            serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        None => serializer.serialize_none(),
    }
}

fn deserialize_rtf<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    encoded
        .map(|s| {
            base64::engine::general_purpose::STANDARD
                .decode(s.as_bytes())
                .map_err(serde::de::Error::custom)
        })
        .transpose()
}

impl ExportedItem {
    fn from_item(item: ClipboardItem, labels: Vec<String>) -> Self {
        // Asset files do not travel with the document.
        let enrichment = Enrichment {
            url_favicon_asset: None,
            url_preview_asset: None,
            ..item.enrichment
        };
        Self {
            kind: item.kind,
            text: item.text,
            html: item.html,
            rtf: item.rtf,
            captured_at: item.captured_at,
            source_app: item.source_app,
            byte_size: item.byte_size,
            generation: item.generation,
            title: item.title,
            pinned: item.pinned,
            enrichment,
            labels,
        }
    }

    /// Rebuild a storable item, recomputing its content hash. None when the
    /// record cannot form a valid item.
    fn into_item(self) -> Option<ClipboardItem> {
        if self.kind == ContentKind::Image {
            return None;
        }
        let hash = canonical_bytes(
            self.kind,
            self.text.as_deref(),
            self.html.as_deref(),
            self.rtf.as_deref(),
            None,
        )
        .map(compute_content_hash)?;

        let mut item = ClipboardItem::new(self.kind, hash, self.captured_at);
        item.text = self.text;
        item.html = self.html;
        item.rtf = self.rtf;
        item.source_app = self.source_app;
        item.byte_size = self.byte_size;
        item.generation = self.generation;
        item.title = self.title;
        item.pinned = self.pinned;
        item.enrichment = self.enrichment;
        item.validate().ok()?;
        Some(item)
    }
}

/// Build the export document for everything exportable in `store`.
pub fn export_document(store: &HistoryStore, now_ms: i64) -> Result<ExportDocument, StoreError> {
    let query = ItemQuery::all()
        .concealed(false)
        .exclude_kind(ContentKind::Image)
        .sort(SortOrder::OldestFirst);

    let mut items = Vec::new();
    for item in store.query(&query)? {
        let labels = store
            .labels_for_item(&item.id)?
            .into_iter()
            .map(|label| label.name)
            .collect();
        items.push(ExportedItem::from_item(item, labels));
    }

    let labels = store
        .list_labels()?
        .into_iter()
        .map(|label| ExportedLabel {
            name: label.name,
            color: label.color,
            sort_order: label.sort_order,
            emoji: label.emoji,
        })
        .collect();

    Ok(ExportDocument {
        version: EXPORT_VERSION,
        exported_at: DateTime::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now),
        items,
        labels,
    })
}

pub fn export_json(store: &HistoryStore, now_ms: i64) -> Result<String, TransferError> {
    let document = export_document(store, now_ms)?;
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Write the export document to `path`. Returns the number of items written.
#[instrument(skip(store))]
pub fn export_to_file(store: &HistoryStore, path: &Path, now_ms: i64) -> Result<usize, TransferError> {
    let document = export_document(store, now_ms)?;
    let json = serde_json::to_string_pretty(&document)?;
    fs::write(path, json).map_err(|source| TransferError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!(
        items = document.items.len(),
        labels = document.labels.len(),
        "Exported clipboard history"
    );
    Ok(document.items.len())
}

/// Parse a document, rejecting missing or unknown versions before decoding
/// the rest.
pub fn parse_document(json: &str) -> Result<ExportDocument, TransferError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let version = match value.get("version") {
        None | Some(serde_json::Value::Null) => return Err(TransferError::MissingVersion),
        Some(version) => version.as_u64().ok_or(TransferError::MissingVersion)?,
    };
    if version != EXPORT_VERSION {
        return Err(TransferError::UnsupportedVersion(version));
    }
    Ok(serde_json::from_value(value)?)
}

pub fn import_json(store: &mut HistoryStore, json: &str) -> Result<ImportReport, TransferError> {
    let document = parse_document(json)?;
    import_document(store, document)
}

#[instrument(skip(store))]
pub fn import_from_file(store: &mut HistoryStore, path: &Path) -> Result<ImportReport, TransferError> {
    let json = fs::read_to_string(path).map_err(|source| TransferError::Io {
        path: path.display().to_string(),
        source,
    })?;
    import_json(store, &json)
}

/// Import a parsed document. Batches already committed stay committed if a
/// later batch fails.
pub fn import_document(
    store: &mut HistoryStore,
    document: ExportDocument,
) -> Result<ImportReport, TransferError> {
    let result = import_records(store, document);
    if result.is_err() {
        store.rollback();
    }
    result
}

fn import_records(
    store: &mut HistoryStore,
    document: ExportDocument,
) -> Result<ImportReport, TransferError> {
    let mut report = ImportReport::default();

    let mut labels: HashMap<String, LabelId> = store
        .list_labels()?
        .into_iter()
        .map(|label| (label.name, label.id))
        .collect();

    let mut wanted: Vec<ExportedLabel> = document.labels.clone();
    for name in document.items.iter().flat_map(|item| item.labels.iter()) {
        if !wanted.iter().any(|label| &label.name == name) {
            wanted.push(ExportedLabel {
                name: name.clone(),
                color: FALLBACK_LABEL_COLOR.to_string(),
                sort_order: 0,
                emoji: None,
            });
        }
    }
    for label in wanted {
        if labels.contains_key(&label.name) {
            continue;
        }
        let mut spec = LabelSpec::new(label.name.clone(), label.color).with_sort_order(label.sort_order);
        spec.emoji = label.emoji;
        let created = match store.create_label(spec) {
            Ok(created) => created,
            Err(StoreError::InvalidLabel(reason)) => {
                warn!(name = %label.name, reason = %reason, "Skipping invalid label");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        labels.insert(created.name, created.id);
        report.labels_created += 1;
    }
    commit(store)?;

    let mut hashes: HashSet<String> = store.all_content_hashes()?;
    let mut batch = 0;

    for record in document.items {
        let label_names = record.labels.clone();
        let Some(item) = record.into_item() else {
            warn!("Skipping export record that does not form a valid item");
            report.skipped += 1;
            continue;
        };
        if hashes.contains(&item.content_hash) {
            report.skipped += 1;
            continue;
        }

        match store.insert(&item) {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                store.clear_conflict();
                report.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        for name in &label_names {
            if let Some(label_id) = labels.get(name) {
                store.attach_label(&item.id, label_id)?;
            }
        }

        hashes.insert(item.content_hash);
        report.imported += 1;
        batch += 1;
        if batch == IMPORT_BATCH_SIZE {
            commit(store)?;
            debug!(imported = report.imported, "Committed import batch");
            batch = 0;
        }
    }
    commit(store)?;

    info!(
        imported = report.imported,
        skipped = report.skipped,
        labels_created = report.labels_created,
        "Imported clipboard history"
    );
    Ok(report)
}

fn commit(store: &mut HistoryStore) -> Result<(), TransferError> {
    match store.save()? {
        SaveOutcome::Committed => Ok(()),
        SaveOutcome::Conflict => {
            let hash = store.clear_conflict().unwrap_or_default();
            store.rollback();
            Err(StoreError::Conflict { hash }.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::types::LabelSpec;

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

    /// Store with text, rich, url, file, concealed and image items plus a label.
    fn populated_store() -> HistoryStore {
        let mut store = HistoryStore::open_in_memory().unwrap();

        let plain = text_item("plain text", 1_000);
        store.insert(&plain).unwrap();

        let mut rich = ClipboardItem::new(ContentKind::RichText, compute_content_hash(b"bold"), 2_000);
        rich.text = Some("bold".into());
        rich.html = Some("<b>bold</b>".into());
        rich.rtf = Some(b"{\\rtf1 \\b bold}".to_vec());
        rich.title = Some("Styled".into());
        rich.pinned = true;
        store.insert(&rich).unwrap();

        let mut url = ClipboardItem::new(
            ContentKind::Url,
            compute_content_hash(b"https://example.com"),
            3_000,
        );
        url.text = Some("https://example.com".into());
        url.enrichment.url_title = Some("Example Domain".into());
        store.insert(&url).unwrap();

        let mut file = ClipboardItem::new(ContentKind::File, compute_content_hash(b"/tmp/a\n/tmp/b"), 4_000);
        file.text = Some("/tmp/a\n/tmp/b".into());
        store.insert(&file).unwrap();

        let mut concealed = text_item("hunter2", 5_000);
        concealed.concealed = true;
        concealed.expires_at = Some(65_000);
        store.insert(&concealed).unwrap();

        let mut image = ClipboardItem::new(ContentKind::Image, "image-hash".into(), 6_000);
        image.image_asset = Some("x.img".into());
        store.insert(&image).unwrap();
        store.save().unwrap();

        let work = store
            .create_label(LabelSpec::new("Work", "blue").with_emoji("💼"))
            .unwrap();
        store.attach_label(&plain.id, &work.id).unwrap();
        store.attach_label(&url.id, &work.id).unwrap();
        store.save().unwrap();
        store
    }

    /// Comparable view of an item, without identity.
    fn content_of(item: &ClipboardItem) -> (ContentKind, Option<String>, Option<String>, Option<Vec<u8>>, i64, Option<String>, bool, Option<String>, String) {
        (
            item.kind,
            item.text.clone(),
            item.html.clone(),
            item.rtf.clone(),
            item.captured_at,
            item.title.clone(),
            item.pinned,
            item.enrichment.url_title.clone(),
            item.content_hash.clone(),
        )
    }

    #[test]
    fn test_export_skips_concealed_and_image_items() {
        let store = populated_store();
        let document = export_document(&store, 10_000).unwrap();

        assert_eq!(document.version, EXPORT_VERSION);
        assert_eq!(document.items.len(), 4);
        assert!(document.items.iter().all(|item| item.kind != ContentKind::Image));
        assert!(document
            .items
            .iter()
            .all(|item| item.text.as_deref() != Some("hunter2")));
        assert_eq!(document.labels.len(), 1);
        assert_eq!(document.items[0].labels, vec!["Work".to_string()]);
    }

    #[test]
    fn test_export_import_preserves_content() {
        let source = populated_store();
        let json = export_json(&source, 10_000).unwrap();

        let mut target = HistoryStore::open_in_memory().unwrap();
        let report = import_json(&mut target, &json).unwrap();
        assert_eq!(report.imported, 4);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.labels_created, 1);

        let expected: Vec<_> = source
            .query(
                &ItemQuery::all()
                    .concealed(false)
                    .exclude_kind(ContentKind::Image)
                    .sort(SortOrder::OldestFirst),
            )
            .unwrap()
            .iter()
            .map(content_of)
            .collect();
        let actual: Vec<_> = target
            .query(&ItemQuery::all().sort(SortOrder::OldestFirst))
            .unwrap()
            .iter()
            .map(content_of)
            .collect();
        assert_eq!(actual, expected);

        let work = target.label_by_name("Work").unwrap().expect("label imported");
        assert_eq!(work.emoji.as_deref(), Some("💼"));
        let tagged = target.query(&ItemQuery::all().label(work.id)).unwrap();
        assert_eq!(tagged.len(), 2);
    }

    #[test]
    fn test_fully_overlapping_import_imports_nothing() {
        let mut store = populated_store();
        let json = export_json(&store, 10_000).unwrap();
        let before = store.count().unwrap();

        let report = import_json(&mut store, &json).unwrap();

        assert_eq!(report.imported, 0);
        assert_eq!(report.skipped, 4, "skipped == total");
        assert_eq!(report.labels_created, 0);
        assert_eq!(store.count().unwrap(), before);
    }

    #[test]
    fn test_version_checked_before_any_mutation() {
        let mut store = HistoryStore::open_in_memory().unwrap();

        let missing = r#"{"exportedAt":"2024-01-01T00:00:00Z","items":[],"labels":[{"name":"X","color":"red"}]}"#;
        assert!(matches!(
            import_json(&mut store, missing),
            Err(TransferError::MissingVersion)
        ));

        let future = r#"{"version":2,"exportedAt":"2024-01-01T00:00:00Z","items":[],"labels":[{"name":"X","color":"red"}]}"#;
        assert!(matches!(
            import_json(&mut store, future),
            Err(TransferError::UnsupportedVersion(2))
        ));

        assert!(store.list_labels().unwrap().is_empty(), "Nothing was created");
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        assert!(matches!(
            import_json(&mut store, "{not json"),
            Err(TransferError::Decode(_))
        ));
        let bad_rtf = r#"{"version":1,"exportedAt":"2024-01-01T00:00:00Z","items":[{"kind":"rich_text","rtf":"***","capturedAt":1}]}"#;
        assert!(matches!(
            import_json(&mut store, bad_rtf),
            Err(TransferError::Decode(_))
        ));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_import_commits_in_batches() {
        let mut source = HistoryStore::open_in_memory().unwrap();
        for i in 0..(IMPORT_BATCH_SIZE * 2 + 7) {
            source.insert(&text_item(&format!("item {i}"), i as i64)).unwrap();
        }
        source.save().unwrap();
        let json = export_json(&source, 0).unwrap();

        let mut target = HistoryStore::open_in_memory().unwrap();
        target.insert(&text_item("item 3", 3)).unwrap();
        target.save().unwrap();

        let report = import_json(&mut target, &json).unwrap();
        assert_eq!(report.imported, IMPORT_BATCH_SIZE * 2 + 6);
        assert_eq!(report.skipped, 1);
        assert!(!target.has_pending_changes());
        assert_eq!(target.count().unwrap(), IMPORT_BATCH_SIZE * 2 + 7);
    }

    #[test]
    fn test_item_labels_missing_from_label_list_are_created() {
        let json = r#"{"version":1,"exportedAt":"2024-01-01T00:00:00Z","items":[{"kind":"text","text":"tagged","capturedAt":1,"labels":["Loose"]}]}"#;
        let mut store = HistoryStore::open_in_memory().unwrap();
        let report = import_json(&mut store, json).unwrap();

        assert_eq!(report.imported, 1);
        assert_eq!(report.labels_created, 1);
        let loose = store.label_by_name("Loose").unwrap().unwrap();
        assert_eq!(loose.color, FALLBACK_LABEL_COLOR);
    }

    #[test]
    fn test_export_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let source = populated_store();

        assert_eq!(export_to_file(&source, &path, 10_000).unwrap(), 4);
        let mut target = HistoryStore::open_in_memory().unwrap();
        assert_eq!(import_from_file(&mut target, &path).unwrap().imported, 4);

        let missing = dir.path().join("nope.json");
        assert!(matches!(
            import_from_file(&mut target, &missing),
            Err(TransferError::Io { .. })
        ));
    }
}
