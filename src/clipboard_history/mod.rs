//! Clipboard History Module
//!
//! Captures clipboard changes into a SQLite-backed history and writes items
//! back on request.
//!
//! ## Features
//! - Generation-based change polling (default every 500ms)
//! - Classification into text, rich text, url, file list and image
//! - Consecutive-duplicate suppression and a unique content hash
//! - Concealed items that expire after a short TTL
//! - Time-based retention (default 30 days), pinned items exempt
//! - Image assets rendered off the engine thread
//! - Paste-back with permission and secure-input gates
//! - Labels, enrichment metadata and JSON export/import
//!
//! ## Module Structure
//! - `types`: Core records (ClipboardItem, Label, Enrichment)
//! - `snapshot`: Raw clipboard representations
//! - `classifier`: Snapshot to content kind
//! - `dedup`: Content hashing and duplicate decisions
//! - `database`: SQLite store and unit of work
//! - `labels`: Label CRUD on the store
//! - `image` / `blob_store` / `asset_worker`: Image assets
//! - `change_detection`: Generation tracking and self-write suppression
//! - `clipboard`: System and in-memory clipboard boundaries
//! - `paste`: Paste-back controller
//! - `expiration` / `retention`: Time-driven deletion
//! - `transfer`: JSON export and import
//! - `monitor`: The engine that owns all of the above

mod asset_worker;
mod blob_store;
mod change_detection;
mod classifier;
mod clipboard;
mod database;
mod dedup;
mod expiration;
mod image;
mod labels;
mod monitor;
mod paste;
mod retention;
mod snapshot;
mod transfer;
mod types;

#[cfg(test)]
mod test_support;

// Types
pub use types::{ClipboardItem, ContentKind, Enrichment, ItemId, Label, LabelId, LabelSpec, SourceApp};

// Snapshots and classification
pub use classifier::{classify, Classification, ClassifiedContent, ClassifierLimits, RejectReason};
pub use snapshot::{ClipboardSnapshot, ClipboardWrite, Representation};

// Store
pub use database::{HistoryStore, ItemQuery, SaveOutcome, SortOrder};
pub use dedup::{compute_content_hash, hash_content};
pub use labels::is_single_emoji;

// Image assets
pub use asset_worker::AssetCleaner;
pub use blob_store::{ImageAssetStore, ImageLimits};

// Clipboard boundary
pub use change_detection::ClipboardChangeDetector;
pub use clipboard::{ClipboardBoundary, MemoryClipboard, SystemClipboard};

// Paste-back
pub use paste::{InputSynthesizer, PasteMode, PasteOutcome, PermissionBoundary, PresentingSurface};

// Expiration and retention
pub use expiration::DEFAULT_CONCEALED_TTL;
pub use retention::{RetentionPolicy, RetentionSweeper, RETENTION_INTERVAL};

// Export / import
pub use transfer::{
    export_json, export_to_file, import_from_file, import_json, ImportReport, EXPORT_VERSION,
};

// Engine
pub use monitor::{
    CaptureOutcome, ClipboardEngine, EngineDeps, EngineHandle, EngineMessage, EngineSettings,
    SourceAppProvider,
};
