//! Paste-back controller
//!
//! Writes a history item back to the clipboard and, when asked, synthesizes
//! the paste keystroke into the frontmost app. Every write arms the change
//! detector's suppression marker so the poller does not capture it again.
//!
//! Gates, in order: accessibility permission (re-queried on every attempt),
//! then secure input. With secure input active the content is written but no
//! keystroke is sent and the surface stays visible.

use anyhow::{bail, Result};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::change_detection::ClipboardChangeDetector;
use super::clipboard::ClipboardBoundary;
use super::snapshot::{ClipboardWrite, Representation};
use super::types::{ClipboardItem, ContentKind, ItemId};
use crate::error::{ClipKeepError, ResultExt};
use crate::scheduler::Scheduler;

/// Delay between hiding the surface and the paste keystroke, so focus has
/// returned to the target app.
pub const DEFAULT_PASTE_DELAY: Duration = Duration::from_millis(250);

pub trait PermissionBoundary: Send + Sync {
    fn is_input_synthesis_permitted(&self) -> bool;
    fn is_secure_input_active(&self) -> bool;
}

pub trait InputSynthesizer: Send + Sync {
    fn synthesize_paste(&self) -> Result<()>;
}

pub trait PresentingSurface: Send + Sync {
    fn hide(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteMode {
    WriteOnly,
    WriteAndPaste,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteOutcome {
    /// Written to the clipboard, nothing else requested.
    Written,
    /// Written, keystroke skipped because secure input is active.
    WrittenSecureInput,
    /// Written, keystroke scheduled.
    PasteScheduled,
    /// Accessibility permission missing; nothing was written.
    PermissionRequired,
}

/// A paste request waiting on an asset load.
pub struct PendingPaste {
    pub item_id: ItemId,
    pub mode: PasteMode,
    pub plain: bool,
    pub reply: Option<SyncSender<Result<PasteOutcome>>>,
}

impl PendingPaste {
    pub fn respond(self, result: Result<PasteOutcome>) {
        match self.reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                result.warn_on_err();
            }
        }
    }
}

/// Crude markup stripper for plain-text fallbacks of markup-only items.
fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Control words that open a destination whose text is not document content.
const RTF_SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "header",
    "footer",
    "listtable",
    "listoverridetable",
    "generator",
    "themedata",
    "latentstyles",
];

/// Plain text carried by an RTF document, for items that only have RTF.
///
/// Handles groups, `\*` and table destinations, `\par`/`\line`/`\tab`,
/// hex escapes (read as Latin-1) and `\uN` with one fallback character.
fn rtf_to_text(rtf: &[u8]) -> String {
    let source = String::from_utf8_lossy(rtf);
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::new();
    let mut groups: Vec<bool> = Vec::new();
    let mut skipping = false;
    let mut fallback_chars = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '{' => groups.push(skipping),
            '}' => skipping = groups.pop().unwrap_or(false),
            '\\' => {
                let Some(&next) = chars.get(i) else { break };
                if next.is_ascii_alphabetic() {
                    let start = i;
                    while chars.get(i).is_some_and(|c| c.is_ascii_alphabetic()) {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect();
                    let param_start = i;
                    if chars.get(i) == Some(&'-') {
                        i += 1;
                    }
                    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                        i += 1;
                    }
                    let param: Option<i32> = chars[param_start..i].iter().collect::<String>().parse().ok();
                    if chars.get(i) == Some(&' ') {
                        i += 1;
                    }
                    if skipping {
                        continue;
                    }
                    match word.as_str() {
                        "par" | "line" => out.push('\n'),
                        "tab" => out.push('\t'),
                        "u" => {
                            // Negative values encode code points above 0x7FFF.
                            let code = param.map(|p| if p < 0 { p + 65_536 } else { p });
                            if let Some(ch) = code.and_then(|p| char::from_u32(p as u32)) {
                                out.push(ch);
                            }
                            fallback_chars = 1;
                        }
                        w if RTF_SKIPPED_DESTINATIONS.contains(&w) => skipping = true,
                        _ => {}
                    }
                    continue;
                }

                i += 1;
                match next {
                    '*' => skipping = true,
                    '\'' => {
                        let hex: String = chars.iter().skip(i).take(2).collect();
                        i += hex.chars().count();
                        if skipping {
                            continue;
                        }
                        if fallback_chars > 0 {
                            fallback_chars -= 1;
                            continue;
                        }
                        if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                            out.push(char::from(byte));
                        }
                    }
                    _ if skipping => {}
                    '\\' | '{' | '}' => out.push(next),
                    '~' => out.push('\u{a0}'),
                    '\n' | '\r' => out.push('\n'),
                    _ => {}
                }
            }
            '\n' | '\r' => {}
            _ if skipping => {}
            _ => {
                if fallback_chars > 0 {
                    fallback_chars -= 1;
                } else {
                    out.push(c);
                }
            }
        }
    }
    out.trim().to_string()
}

/// Clipboard representations for `item`, richest first.
///
/// `image` carries the full asset bytes for image items. `plain` strips rich
/// text down to its plain-text representation.
pub fn representations_for(
    item: &ClipboardItem,
    plain: bool,
    image: Option<Vec<u8>>,
) -> Result<ClipboardWrite> {
    let mut reps = Vec::new();
    match item.kind {
        ContentKind::Text => {
            if let Some(text) = &item.text {
                reps.push(Representation::Text(text.clone()));
            }
        }
        ContentKind::RichText => {
            let plain_text = item
                .text
                .clone()
                .or_else(|| item.html.as_deref().map(strip_markup))
                .or_else(|| item.rtf.as_deref().map(rtf_to_text))
                .filter(|text| !text.is_empty());
            if !plain {
                if let Some(rtf) = &item.rtf {
                    reps.push(Representation::Rtf(rtf.clone()));
                }
                if let Some(html) = &item.html {
                    reps.push(Representation::Html(html.clone()));
                }
            }
            if let Some(text) = plain_text {
                reps.push(Representation::Text(text));
            }
        }
        ContentKind::Url => {
            if let Some(url) = &item.text {
                reps.push(Representation::Url(url.clone()));
                reps.push(Representation::Text(url.clone()));
            }
        }
        ContentKind::Image => match image {
            Some(bytes) => reps.push(Representation::Image(bytes)),
            None => bail!("Image bytes for item {} are unavailable", item.id),
        },
        ContentKind::File => {
            let paths = item.file_paths();
            if !paths.is_empty() {
                reps.push(Representation::FileList(paths));
            }
        }
    }

    if reps.is_empty() {
        bail!("Item {} has nothing to write", item.id);
    }
    Ok(ClipboardWrite::new(reps))
}

pub struct PasteBackController {
    clipboard: Arc<dyn ClipboardBoundary>,
    permissions: Arc<dyn PermissionBoundary>,
    synthesizer: Arc<dyn InputSynthesizer>,
    surface: Arc<dyn PresentingSurface>,
    scheduler: Arc<dyn Scheduler>,
    paste_delay: Duration,
}

impl PasteBackController {
    pub fn new(
        clipboard: Arc<dyn ClipboardBoundary>,
        permissions: Arc<dyn PermissionBoundary>,
        synthesizer: Arc<dyn InputSynthesizer>,
        surface: Arc<dyn PresentingSurface>,
        scheduler: Arc<dyn Scheduler>,
        paste_delay: Duration,
    ) -> Self {
        Self {
            clipboard,
            permissions,
            synthesizer,
            surface,
            scheduler,
            paste_delay,
        }
    }

    fn write_and_arm(
        &self,
        write: &ClipboardWrite,
        detector: &mut ClipboardChangeDetector,
    ) -> Result<()> {
        let generation = self
            .clipboard
            .write(write)
            .map_err(|e| ClipKeepError::Clipboard(format!("{e:#}")))?;
        detector.arm_suppression(generation);
        debug!(generation, types = ?write.type_names(), "Wrote item to clipboard");
        Ok(())
    }

    #[instrument(skip(self, write, detector))]
    pub fn paste(
        &self,
        write: &ClipboardWrite,
        mode: PasteMode,
        detector: &mut ClipboardChangeDetector,
    ) -> Result<PasteOutcome> {
        if mode == PasteMode::WriteOnly {
            self.write_and_arm(write, detector)?;
            self.surface.hide();
            return Ok(PasteOutcome::Written);
        }

        if !self.permissions.is_input_synthesis_permitted() {
            info!("Accessibility permission not granted, not pasting");
            return Ok(PasteOutcome::PermissionRequired);
        }

        if self.permissions.is_secure_input_active() {
            self.write_and_arm(write, detector)?;
            warn!("Secure input is active, wrote clipboard without paste keystroke");
            return Ok(PasteOutcome::WrittenSecureInput);
        }

        self.write_and_arm(write, detector)?;
        self.surface.hide();

        let synthesizer = Arc::clone(&self.synthesizer);
        // Detached: the keystroke must fire even though nobody keeps the handle.
        let _ = self.scheduler.after(
            self.paste_delay,
            Box::new(move || {
                synthesizer.synthesize_paste().log_err();
            }),
        );
        debug!(delay_ms = self.paste_delay.as_millis() as u64, "Scheduled paste keystroke");
        Ok(PasteOutcome::PasteScheduled)
    }
}
