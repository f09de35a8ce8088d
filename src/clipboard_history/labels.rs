//! Labels and the item/label relation
//!
//! Labels live in their own table and attach to items through the
//! `item_labels` join table. Deleting a label or an item removes only the
//! relation rows (ON DELETE CASCADE). Mutations join the store's current
//! unit of work, so callers `save()` as with items.

use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::database::{is_unique_violation, HistoryStore};
use super::types::{ItemId, Label, LabelId, LabelSpec};
use crate::error::StoreError;

const ZWJ: char = '\u{200D}';
const KEYCAP: char = '\u{20E3}';

fn is_modifier(c: char) -> bool {
    matches!(c,
        '\u{FE0E}' | '\u{FE0F}'           // variation selectors
        | '\u{1F3FB}'..='\u{1F3FF}'       // skin tones
        | KEYCAP
        | '\u{E0020}'..='\u{E007F}'       // tag sequences (subdivision flags)
    )
}

fn is_regional_indicator(c: char) -> bool {
    matches!(c, '\u{1F1E6}'..='\u{1F1FF}')
}

fn is_emoji_base(c: char) -> bool {
    matches!(c,
        '\u{00A9}' | '\u{00AE}' | '\u{203C}' | '\u{2049}' | '\u{2122}' | '\u{2139}'
        | '\u{2194}'..='\u{21AA}'
        | '\u{231A}'..='\u{23FF}'
        | '\u{24C2}'
        | '\u{25AA}'..='\u{27BF}'
        | '\u{2934}' | '\u{2935}'
        | '\u{2B05}'..='\u{2B55}'
        | '\u{3030}' | '\u{303D}' | '\u{3297}' | '\u{3299}'
        | '\u{1F000}'..='\u{1FAFF}'
    ) || c == '#'
        || c == '*'
        || c.is_ascii_digit()
}

/// True when `s` is exactly one emoji grapheme.
///
/// Accepts a base emoji followed by modifiers (variation selectors, skin
/// tones, keycap, tag characters), ZWJ sequences, and regional-indicator
/// flag pairs.
pub fn is_single_emoji(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    let Some(&first) = chars.first() else {
        return false;
    };

    if is_regional_indicator(first) {
        return chars.len() == 2 && is_regional_indicator(chars[1]);
    }
    if !is_emoji_base(first) {
        return false;
    }
    // Bare ASCII digits and '#'/'*' are only emoji as keycaps.
    if first.is_ascii() && !chars.contains(&KEYCAP) {
        return false;
    }

    let mut after_zwj = false;
    for &c in &chars[1..] {
        if c == ZWJ {
            if after_zwj {
                return false;
            }
            after_zwj = true;
        } else if after_zwj {
            if !is_emoji_base(c) || c.is_ascii() {
                return false;
            }
            after_zwj = false;
        } else if !is_modifier(c) {
            return false;
        }
    }
    !after_zwj
}

fn validate_spec(spec: &LabelSpec) -> Result<(), StoreError> {
    if spec.name.trim().is_empty() {
        return Err(StoreError::InvalidLabel("name must not be empty".to_string()));
    }
    if let Some(emoji) = &spec.emoji {
        if !is_single_emoji(emoji) {
            return Err(StoreError::InvalidLabel(format!(
                "'{}' is not a single emoji",
                emoji
            )));
        }
    }
    Ok(())
}

fn row_to_label(row: &Row<'_>) -> rusqlite::Result<Label> {
    Ok(Label {
        id: LabelId::from(row.get::<_, String>(0)?),
        name: row.get(1)?,
        color: row.get(2)?,
        sort_order: row.get(3)?,
        emoji: row.get(4)?,
    })
}

fn map_label_error(err: rusqlite::Error, name: &str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::InvalidLabel(format!("label '{}' already exists", name))
    } else {
        StoreError::Sqlite(err)
    }
}

impl HistoryStore {
    pub fn create_label(&mut self, spec: LabelSpec) -> Result<Label, StoreError> {
        validate_spec(&spec)?;
        self.begin_unit()?;
        let label = Label {
            id: LabelId::new(),
            name: spec.name.trim().to_string(),
            color: spec.color,
            sort_order: spec.sort_order,
            emoji: spec.emoji,
        };
        self.conn
            .execute(
                "INSERT INTO labels (id, name, color, sort_order, emoji) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![label.id.as_str(), label.name, label.color, label.sort_order, label.emoji],
            )
            .map_err(|e| map_label_error(e, &label.name))?;
        debug!(id = %label.id, name = %label.name, "Created label");
        Ok(label)
    }

    pub fn update_label(&mut self, id: &LabelId, spec: LabelSpec) -> Result<Label, StoreError> {
        validate_spec(&spec)?;
        self.begin_unit()?;
        let name = spec.name.trim().to_string();
        let changed = self
            .conn
            .execute(
                "UPDATE labels SET name = ?2, color = ?3, sort_order = ?4, emoji = ?5 WHERE id = ?1",
                params![id.as_str(), name, spec.color, spec.sort_order, spec.emoji],
            )
            .map_err(|e| map_label_error(e, &name))?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(Label {
            id: id.clone(),
            name,
            color: spec.color,
            sort_order: spec.sort_order,
            emoji: spec.emoji,
        })
    }

    /// Delete a label; its relation rows go with it, items stay.
    pub fn delete_label(&mut self, id: &LabelId) -> Result<bool, StoreError> {
        self.begin_unit()?;
        let deleted = self
            .conn
            .execute("DELETE FROM labels WHERE id = ?1", params![id.as_str()])?;
        Ok(deleted > 0)
    }

    /// Attach a label to an item. Attaching twice is a no-op.
    pub fn attach_label(&mut self, item: &ItemId, label: &LabelId) -> Result<(), StoreError> {
        if self.get(item)?.is_none() {
            return Err(StoreError::NotFound(item.to_string()));
        }
        if self.label(label)?.is_none() {
            return Err(StoreError::NotFound(label.to_string()));
        }
        self.begin_unit()?;
        self.conn.execute(
            "INSERT OR IGNORE INTO item_labels (item_id, label_id) VALUES (?1, ?2)",
            params![item.as_str(), label.as_str()],
        )?;
        Ok(())
    }

    pub fn detach_label(&mut self, item: &ItemId, label: &LabelId) -> Result<bool, StoreError> {
        self.begin_unit()?;
        let removed = self.conn.execute(
            "DELETE FROM item_labels WHERE item_id = ?1 AND label_id = ?2",
            params![item.as_str(), label.as_str()],
        )?;
        Ok(removed > 0)
    }

    pub fn label(&self, id: &LabelId) -> Result<Option<Label>, StoreError> {
        let label = self
            .conn
            .query_row(
                "SELECT id, name, color, sort_order, emoji FROM labels WHERE id = ?1",
                params![id.as_str()],
                row_to_label,
            )
            .optional()?;
        Ok(label)
    }

    pub fn label_by_name(&self, name: &str) -> Result<Option<Label>, StoreError> {
        let label = self
            .conn
            .query_row(
                "SELECT id, name, color, sort_order, emoji FROM labels WHERE name = ?1",
                params![name.trim()],
                row_to_label,
            )
            .optional()?;
        Ok(label)
    }

    /// All labels, by sort order then name.
    pub fn list_labels(&self) -> Result<Vec<Label>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, color, sort_order, emoji FROM labels ORDER BY sort_order, name",
        )?;
        let labels = stmt
            .query_map([], row_to_label)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(labels)
    }

    pub fn labels_for_item(&self, item: &ItemId) -> Result<Vec<Label>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT l.id, l.name, l.color, l.sort_order, l.emoji
             FROM labels l JOIN item_labels il ON il.label_id = l.id
             WHERE il.item_id = ?1
             ORDER BY l.sort_order, l.name",
        )?;
        let labels = stmt
            .query_map(params![item.as_str()], row_to_label)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(labels)
    }
}
