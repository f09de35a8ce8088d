//! Core types for clipboard history
//!
//! Items, labels, enrichment metadata and the id newtypes the rest of the
//! engine passes around instead of holding on to persisted entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Content kind of a history item. Exactly one per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    RichText,
    Url,
    Image,
    File,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::RichText => "rich_text",
            ContentKind::Url => "url",
            ContentKind::Image => "image",
            ContentKind::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ContentKind::Text),
            "rich_text" => Some(ContentKind::RichText),
            "url" => Some(ContentKind::Url),
            "image" => Some(ContentKind::Image),
            "file" => Some(ContentKind::File),
            _ => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable, opaque identifier of a history item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(String);

impl LabelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LabelId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for LabelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Application that owned the clipboard when an item was captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceApp {
    pub bundle_id: String,
    pub name: String,
}

/// Metadata attached to an existing item by external enrichers.
///
/// `None` fields mean "unknown"; applying an enrichment only overwrites the
/// fields it carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub detected_language: Option<String>,
    pub detected_color: Option<String>,
    pub url_title: Option<String>,
    /// Asset filename of the page favicon.
    pub url_favicon_asset: Option<String>,
    /// Asset filename of the page preview image.
    pub url_preview_asset: Option<String>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.detected_language.is_none()
            && self.detected_color.is_none()
            && self.url_title.is_none()
            && self.url_favicon_asset.is_none()
            && self.url_preview_asset.is_none()
    }

    /// Overlay the fields set in `other` onto `self`.
    pub fn merge(&mut self, other: &Enrichment) {
        if other.detected_language.is_some() {
            self.detected_language = other.detected_language.clone();
        }
        if other.detected_color.is_some() {
            self.detected_color = other.detected_color.clone();
        }
        if other.url_title.is_some() {
            self.url_title = other.url_title.clone();
        }
        if other.url_favicon_asset.is_some() {
            self.url_favicon_asset = other.url_favicon_asset.clone();
        }
        if other.url_preview_asset.is_some() {
            self.url_preview_asset = other.url_preview_asset.clone();
        }
    }
}

/// A captured clipboard history item.
///
/// Timestamps are UTC epoch milliseconds. `expires_at` is set iff `concealed`.
/// For `File` items `text` holds the newline-joined path list; for `Url` items
/// it holds the trimmed URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardItem {
    pub id: ItemId,
    pub kind: ContentKind,
    pub text: Option<String>,
    pub html: Option<String>,
    pub rtf: Option<Vec<u8>>,
    pub captured_at: i64,
    pub source_app: Option<SourceApp>,
    pub byte_size: i64,
    pub generation: i64,
    pub image_asset: Option<String>,
    pub thumbnail_asset: Option<String>,
    pub concealed: bool,
    pub expires_at: Option<i64>,
    pub content_hash: String,
    pub title: Option<String>,
    pub pinned: bool,
    pub enrichment: Enrichment,
}

impl ClipboardItem {
    /// A bare item of `kind` with a fresh id. Payload fields are filled in by
    /// the caller.
    pub fn new(kind: ContentKind, content_hash: String, captured_at: i64) -> Self {
        Self {
            id: ItemId::new(),
            kind,
            text: None,
            html: None,
            rtf: None,
            captured_at,
            source_app: None,
            byte_size: 0,
            generation: 0,
            image_asset: None,
            thumbnail_asset: None,
            concealed: false,
            expires_at: None,
            content_hash,
            title: None,
            pinned: false,
            enrichment: Enrichment::default(),
        }
    }

    /// Every asset filename this item references, primary and enrichment.
    pub fn asset_names(&self) -> Vec<String> {
        [
            &self.image_asset,
            &self.thumbnail_asset,
            &self.enrichment.url_favicon_asset,
            &self.enrichment.url_preview_asset,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }

    /// File paths of a `File` item.
    pub fn file_paths(&self) -> Vec<String> {
        match (&self.kind, &self.text) {
            (ContentKind::File, Some(text)) => text
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Checks the per-item invariants the store enforces on every write.
    pub fn validate(&self) -> Result<(), String> {
        if self.concealed != self.expires_at.is_some() {
            return Err(format!(
                "item {}: expires_at must be set iff concealed (concealed={})",
                self.id, self.concealed
            ));
        }
        if self.content_hash.is_empty() {
            return Err(format!("item {}: empty content hash", self.id));
        }
        let payload_ok = match self.kind {
            ContentKind::Text | ContentKind::Url | ContentKind::File => self.text.is_some(),
            ContentKind::RichText => {
                self.text.is_some() || self.html.is_some() || self.rtf.is_some()
            }
            ContentKind::Image => self.image_asset.is_some(),
        };
        if !payload_ok {
            return Err(format!(
                "item {}: missing payload for kind {}",
                self.id, self.kind
            ));
        }
        Ok(())
    }
}

/// A label that can be attached to many items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub name: String,
    pub color: String,
    pub sort_order: i64,
    pub emoji: Option<String>,
}

/// Fields for creating or replacing a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: String,
    pub color: String,
    pub sort_order: i64,
    pub emoji: Option<String>,
}

impl LabelSpec {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            sort_order: 0,
            emoji: None,
        }
    }

    pub fn with_sort_order(mut self, sort_order: i64) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }
}
