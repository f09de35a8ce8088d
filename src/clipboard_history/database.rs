//! Clipboard history database
//!
//! SQLite-backed store that exclusively owns persisted items and labels.
//! The engine thread holds the only `HistoryStore`; nothing else touches the
//! connection.
//!
//! Mutations open a unit of work lazily (`BEGIN IMMEDIATE` on the first
//! write). `save()` commits it, `rollback()` discards it. A unique-hash
//! violation is reported as [`StoreError::Conflict`] and remembered until the
//! caller rolls back, so `save()` reports `SaveOutcome::Conflict` instead of
//! committing the rest of a poisoned unit.

use anyhow::{Context, Result};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use super::types::{ClipboardItem, ContentKind, Enrichment, ItemId, LabelId, SourceApp};
use crate::error::StoreError;

/// Column order shared by every item SELECT, INSERT and UPDATE.
const ITEM_COLUMNS: &str = "id, kind, text, html, rtf, captured_at, source_bundle_id, \
     source_name, byte_size, generation, image_asset, thumbnail_asset, concealed, \
     expires_at, content_hash, title, pinned, detected_language, detected_color, \
     url_title, url_favicon_asset, url_preview_asset";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Committed,
    /// The unit of work hit a unique-hash violation; roll back.
    Conflict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Predicate, sort and limit for [`HistoryStore::query`].
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    pub kind: Option<ContentKind>,
    pub exclude_kind: Option<ContentKind>,
    pub concealed: Option<bool>,
    pub pinned: Option<bool>,
    /// `captured_at < value`
    pub captured_before: Option<i64>,
    /// `expires_at <= value`
    pub expires_at_or_before: Option<i64>,
    pub label: Option<LabelId>,
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl ItemQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: ContentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn exclude_kind(mut self, kind: ContentKind) -> Self {
        self.exclude_kind = Some(kind);
        self
    }

    pub fn concealed(mut self, concealed: bool) -> Self {
        self.concealed = Some(concealed);
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    pub fn captured_before(mut self, cutoff_ms: i64) -> Self {
        self.captured_before = Some(cutoff_ms);
        self
    }

    pub fn expires_at_or_before(mut self, now_ms: i64) -> Self {
        self.expires_at_or_before = Some(now_ms);
        self
    }

    pub fn label(mut self, label: LabelId) -> Self {
        self.label = Some(label);
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub struct HistoryStore {
    pub(super) conn: Connection,
    pending_conflict: Option<String>,
}

impl HistoryStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        conn.execute_batch("PRAGMA auto_vacuum = INCREMENTAL;")
            .context("Failed to enable incremental auto_vacuum")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to enable WAL mode")?;
        // Avoids silent capture loss while another handle holds the lock.
        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .context("Failed to set busy_timeout")?;

        let store = Self::init(conn)?;
        info!(path = %path.display(), "Opened clipboard history database");
        Ok(store)
    }

    /// In-memory store for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        create_schema(&conn)?;
        run_migrations(&conn)?;
        create_indexes(&conn)?;
        Ok(Self {
            conn,
            pending_conflict: None,
        })
    }

    /// Open the unit of work if none is open.
    pub(super) fn begin_unit(&mut self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        }
        Ok(())
    }

    /// True while an uncommitted unit of work is open.
    pub fn has_pending_changes(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Map a write error, remembering unique violations for `save()`.
    fn map_write_error(&mut self, err: rusqlite::Error, hash: &str) -> StoreError {
        if is_unique_violation(&err) {
            self.pending_conflict = Some(hash.to_string());
            StoreError::Conflict {
                hash: hash.to_string(),
            }
        } else {
            StoreError::Sqlite(err)
        }
    }

    /// Insert a new item.
    pub fn insert(&mut self, item: &ClipboardItem) -> Result<ItemId, StoreError> {
        item.validate().map_err(StoreError::InvalidItem)?;
        self.begin_unit()?;

        let sql = format!(
            "INSERT INTO items ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, \
             ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            ITEM_COLUMNS
        );
        if let Err(e) = self.conn.execute(&sql, params_from_iter(item_params(item))) {
            return Err(self.map_write_error(e, &item.content_hash));
        }

        debug!(id = %item.id, kind = item.kind.as_str(), hash = %item.content_hash, "Inserted clipboard item");
        Ok(item.id.clone())
    }

    /// Apply `mutate` to the stored item and write it back.
    pub fn update<F>(&mut self, id: &ItemId, mutate: F) -> Result<ClipboardItem, StoreError>
    where
        F: FnOnce(&mut ClipboardItem),
    {
        let mut item = self
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        mutate(&mut item);
        item.id = id.clone();
        item.validate().map_err(StoreError::InvalidItem)?;
        self.begin_unit()?;

        let sql = "UPDATE items SET kind = ?2, text = ?3, html = ?4, rtf = ?5, captured_at = ?6, \
             source_bundle_id = ?7, source_name = ?8, byte_size = ?9, generation = ?10, \
             image_asset = ?11, thumbnail_asset = ?12, concealed = ?13, expires_at = ?14, \
             content_hash = ?15, title = ?16, pinned = ?17, detected_language = ?18, \
             detected_color = ?19, url_title = ?20, url_favicon_asset = ?21, \
             url_preview_asset = ?22 WHERE id = ?1";
        if let Err(e) = self.conn.execute(sql, params_from_iter(item_params(&item))) {
            return Err(self.map_write_error(e, &item.content_hash));
        }
        Ok(item)
    }

    /// Delete an item, returning it so the caller can release its assets.
    pub fn delete(&mut self, id: &ItemId) -> Result<Option<ClipboardItem>, StoreError> {
        let Some(item) = self.get(id)? else {
            return Ok(None);
        };
        self.begin_unit()?;
        self.conn
            .execute("DELETE FROM items WHERE id = ?1", params![id.as_str()])?;
        debug!(id = %id, "Deleted clipboard item");
        Ok(Some(item))
    }

    /// Delete every item matching `query` inside the current unit of work.
    pub fn delete_matching(&mut self, query: &ItemQuery) -> Result<Vec<ClipboardItem>, StoreError> {
        let items = self.query(query)?;
        if items.is_empty() {
            return Ok(items);
        }
        self.begin_unit()?;
        let mut stmt = self.conn.prepare_cached("DELETE FROM items WHERE id = ?1")?;
        for item in &items {
            stmt.execute(params![item.id.as_str()])?;
        }
        Ok(items)
    }

    /// Delete every item. Labels survive. Returns the asset filenames that
    /// were referenced.
    pub fn clear_all(&mut self) -> Result<Vec<String>, StoreError> {
        let assets: Vec<String> = self.referenced_assets()?.into_iter().collect();
        self.begin_unit()?;
        let deleted = self.conn.execute("DELETE FROM items", [])?;
        info!(deleted, "Cleared clipboard history");
        Ok(assets)
    }

    pub fn get(&self, id: &ItemId) -> Result<Option<ClipboardItem>, StoreError> {
        let sql = format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS);
        let item = self
            .conn
            .query_row(&sql, params![id.as_str()], row_to_item)
            .optional()?;
        Ok(item)
    }

    pub fn query(&self, query: &ItemQuery) -> Result<Vec<ClipboardItem>, StoreError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(kind) = query.kind {
            clauses.push("kind = ?");
            values.push(Box::new(kind.as_str()));
        }
        if let Some(kind) = query.exclude_kind {
            clauses.push("kind != ?");
            values.push(Box::new(kind.as_str()));
        }
        if let Some(concealed) = query.concealed {
            clauses.push("concealed = ?");
            values.push(Box::new(concealed));
        }
        if let Some(pinned) = query.pinned {
            clauses.push("pinned = ?");
            values.push(Box::new(pinned));
        }
        if let Some(cutoff) = query.captured_before {
            clauses.push("captured_at < ?");
            values.push(Box::new(cutoff));
        }
        if let Some(now) = query.expires_at_or_before {
            clauses.push("expires_at IS NOT NULL AND expires_at <= ?");
            values.push(Box::new(now));
        }
        if let Some(label) = &query.label {
            clauses.push("id IN (SELECT item_id FROM item_labels WHERE label_id = ?)");
            values.push(Box::new(label.as_str().to_string()));
        }

        let mut sql = format!("SELECT {} FROM items", ITEM_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        // rowid breaks ties between items captured in the same millisecond.
        sql.push_str(match query.sort {
            SortOrder::NewestFirst => " ORDER BY captured_at DESC, rowid DESC",
            SortOrder::OldestFirst => " ORDER BY captured_at ASC, rowid ASC",
        });
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// The most recently captured item.
    pub fn latest_item(&self) -> Result<Option<ClipboardItem>, StoreError> {
        Ok(self.query(&ItemQuery::all().limit(1))?.into_iter().next())
    }

    pub fn latest_content_hash(&self) -> Result<Option<String>, StoreError> {
        let hash = self
            .conn
            .query_row(
                "SELECT content_hash FROM items ORDER BY captured_at DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn all_content_hashes(&self) -> Result<HashSet<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT content_hash FROM items")?;
        let hashes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(hashes)
    }

    /// Asset filenames referenced by any live item.
    pub fn referenced_assets(&self) -> Result<HashSet<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT image_asset, thumbnail_asset, url_favicon_asset, url_preview_asset FROM items",
        )?;
        let mut assets = HashSet::new();
        let rows = stmt.query_map([], |row| {
            Ok([
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ])
        })?;
        for row in rows {
            assets.extend(row?.into_iter().flatten());
        }
        Ok(assets)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Attach enricher output to an item. A vanished item is a no-op.
    pub fn apply_enrichment(
        &mut self,
        id: &ItemId,
        enrichment: &Enrichment,
    ) -> Result<bool, StoreError> {
        if enrichment.is_empty() {
            return Ok(false);
        }
        not_found_as_false(self.update(id, |item| item.enrichment.merge(enrichment)))
    }

    pub fn set_pinned(&mut self, id: &ItemId, pinned: bool) -> Result<bool, StoreError> {
        not_found_as_false(self.update(id, |item| item.pinned = pinned))
    }

    pub fn set_title(&mut self, id: &ItemId, title: Option<String>) -> Result<bool, StoreError> {
        not_found_as_false(self.update(id, |item| item.title = title))
    }

    /// Commit the open unit of work.
    ///
    /// On a remembered conflict the unit stays open and `Conflict` is returned;
    /// the caller rolls back. A failed commit is rolled back before returning.
    pub fn save(&mut self) -> Result<SaveOutcome, StoreError> {
        if let Some(hash) = &self.pending_conflict {
            debug!(hash = %hash, "Unit of work has a conflict, not committing");
            return Ok(SaveOutcome::Conflict);
        }
        if self.conn.is_autocommit() {
            return Ok(SaveOutcome::Committed);
        }
        if let Err(e) = self.conn.execute_batch("COMMIT;") {
            self.rollback();
            if is_unique_violation(&e) {
                return Ok(SaveOutcome::Conflict);
            }
            return Err(StoreError::Sqlite(e));
        }
        Ok(SaveOutcome::Committed)
    }

    /// Discard the open unit of work, if any.
    pub fn rollback(&mut self) {
        self.pending_conflict = None;
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK;") {
            warn!(error = %e, "Rollback failed");
        }
    }

    /// Forget a conflict whose statement SQLite already undid, keeping the
    /// rest of the unit of work. Used by batch imports.
    pub fn clear_conflict(&mut self) -> Option<String> {
        self.pending_conflict.take()
    }

    /// Reclaim free pages and optionally checkpoint the WAL. Skipped while a
    /// unit of work is open.
    pub fn run_maintenance(&self, checkpoint: bool) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            debug!("Skipping maintenance, unit of work open");
            return Ok(());
        }
        self.conn.execute_batch("PRAGMA incremental_vacuum(100);")?;
        debug!("Incremental vacuum completed");
        if checkpoint {
            self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
            debug!("WAL checkpoint completed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("pending", &self.has_pending_changes())
            .field("pending_conflict", &self.pending_conflict)
            .finish()
    }
}

fn not_found_as_false(result: Result<ClipboardItem, StoreError>) -> Result<bool, StoreError> {
    match result {
        Ok(_) => Ok(true),
        Err(StoreError::NotFound(id)) => {
            debug!(id = %id, "Item vanished before update");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

pub(super) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

fn item_params(item: &ClipboardItem) -> Vec<Box<dyn ToSql + '_>> {
    let source = item.source_app.as_ref();
    vec![
        Box::new(item.id.as_str()),
        Box::new(item.kind.as_str()),
        Box::new(item.text.as_deref()),
        Box::new(item.html.as_deref()),
        Box::new(item.rtf.as_deref()),
        Box::new(item.captured_at),
        Box::new(source.map(|s| s.bundle_id.as_str())),
        Box::new(source.map(|s| s.name.as_str())),
        Box::new(item.byte_size),
        Box::new(item.generation),
        Box::new(item.image_asset.as_deref()),
        Box::new(item.thumbnail_asset.as_deref()),
        Box::new(item.concealed),
        Box::new(item.expires_at),
        Box::new(item.content_hash.as_str()),
        Box::new(item.title.as_deref()),
        Box::new(item.pinned),
        Box::new(item.enrichment.detected_language.as_deref()),
        Box::new(item.enrichment.detected_color.as_deref()),
        Box::new(item.enrichment.url_title.as_deref()),
        Box::new(item.enrichment.url_favicon_asset.as_deref()),
        Box::new(item.enrichment.url_preview_asset.as_deref()),
    ]
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<ClipboardItem> {
    let kind_str: String = row.get(1)?;
    let kind = ContentKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown content kind '{}'", kind_str).into(),
        )
    })?;

    let bundle_id: Option<String> = row.get(6)?;
    let name: Option<String> = row.get(7)?;
    let source_app = bundle_id.map(|bundle_id| SourceApp {
        name: name.unwrap_or_else(|| bundle_id.clone()),
        bundle_id,
    });

    Ok(ClipboardItem {
        id: ItemId::from(row.get::<_, String>(0)?),
        kind,
        text: row.get(2)?,
        html: row.get(3)?,
        rtf: row.get(4)?,
        captured_at: row.get(5)?,
        source_app,
        byte_size: row.get(8)?,
        generation: row.get(9)?,
        image_asset: row.get(10)?,
        thumbnail_asset: row.get(11)?,
        concealed: row.get(12)?,
        expires_at: row.get(13)?,
        content_hash: row.get(14)?,
        title: row.get(15)?,
        pinned: row.get(16)?,
        enrichment: Enrichment {
            detected_language: row.get(17)?,
            detected_color: row.get(18)?,
            url_title: row.get(19)?,
            url_favicon_asset: row.get(20)?,
            url_preview_asset: row.get(21)?,
        },
    })
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            text TEXT,
            html TEXT,
            rtf BLOB,
            captured_at INTEGER NOT NULL,
            source_bundle_id TEXT,
            source_name TEXT,
            byte_size INTEGER NOT NULL DEFAULT 0,
            generation INTEGER NOT NULL DEFAULT 0,
            image_asset TEXT,
            thumbnail_asset TEXT,
            concealed INTEGER NOT NULL DEFAULT 0,
            expires_at INTEGER,
            content_hash TEXT NOT NULL UNIQUE
        )",
        [],
    )
    .context("Failed to create items table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS labels (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            color TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            emoji TEXT
        )",
        [],
    )
    .context("Failed to create labels table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS item_labels (
            item_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            label_id TEXT NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
            PRIMARY KEY (item_id, label_id)
        )",
        [],
    )
    .context("Failed to create item_labels table")?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "items", "title", "TEXT")?;
    add_column_if_missing(conn, "items", "pinned", "INTEGER NOT NULL DEFAULT 0")?;
    add_column_if_missing(conn, "items", "detected_language", "TEXT")?;
    add_column_if_missing(conn, "items", "detected_color", "TEXT")?;
    add_column_if_missing(conn, "items", "url_title", "TEXT")?;
    add_column_if_missing(conn, "items", "url_favicon_asset", "TEXT")?;
    add_column_if_missing(conn, "items", "url_preview_asset", "TEXT")?;
    Ok(())
}

fn add_column_if_missing(conn: &Connection, table: &str, name: &str, col_type: &str) -> Result<()> {
    let has: bool = conn
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name='{}'",
                table, name
            ),
            [],
            |row| row.get::<_, i32>(0),
        )
        .map(|c| c > 0)
        .unwrap_or(false);

    if !has {
        conn.execute(
            &format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, col_type),
            [],
        )
        .with_context(|| format!("Failed to add {}.{} column", table, name))?;
        info!(table, column = name, "Added column");
    }
    Ok(())
}

fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_items_captured_at ON items(captured_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_items_expiry ON items(concealed, expires_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_item_labels_label ON item_labels(label_id)",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
#[path = "database_tests.rs"]
mod tests;
