//! Clipboard boundary
//!
//! The engine never talks to the OS clipboard directly; it goes through
//! [`ClipboardBoundary`]. [`SystemClipboard`] is the real one (arboard, plus
//! NSPasteboard for change counts, markers and rich types on macOS).
//! [`MemoryClipboard`] is an in-process clipboard for tests and headless runs.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::debug;

use super::snapshot::{ClipboardSnapshot, ClipboardWrite, Representation};

pub trait ClipboardBoundary: Send + Sync {
    /// Monotonic change counter, or None when it cannot be read.
    fn current_generation(&self) -> Option<i64>;

    /// Read every supported representation currently on the clipboard.
    fn read_snapshot(&self) -> Result<ClipboardSnapshot>;

    /// Replace the clipboard contents. Returns the generation the write
    /// produced when the platform can report it.
    fn write(&self, write: &ClipboardWrite) -> Result<Option<i64>>;
}

// ============================================================================
// In-memory clipboard
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    generation: i64,
    snapshot: ClipboardSnapshot,
    writes: usize,
}

/// Clipboard that lives in process memory.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    state: Mutex<MemoryState>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate another application putting `snapshot` on the clipboard.
    pub fn copy_external(&self, mut snapshot: ClipboardSnapshot) -> i64 {
        let mut state = self.state.lock();
        state.generation += 1;
        snapshot.generation = state.generation;
        state.snapshot = snapshot;
        state.generation
    }

    pub fn copy_text(&self, text: &str) -> i64 {
        self.copy_external(ClipboardSnapshot::text(0, text))
    }

    pub fn contents(&self) -> ClipboardSnapshot {
        self.state.lock().snapshot.clone()
    }

    /// Number of writes made through [`ClipboardBoundary::write`].
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    pub fn generation(&self) -> i64 {
        self.state.lock().generation
    }
}

impl ClipboardBoundary for MemoryClipboard {
    fn current_generation(&self) -> Option<i64> {
        Some(self.state.lock().generation)
    }

    fn read_snapshot(&self) -> Result<ClipboardSnapshot> {
        Ok(self.state.lock().snapshot.clone())
    }

    fn write(&self, write: &ClipboardWrite) -> Result<Option<i64>> {
        let mut snapshot = ClipboardSnapshot::default();
        for rep in &write.representations {
            match rep {
                Representation::Rtf(bytes) => snapshot.rtf = Some(bytes.clone()),
                Representation::Html(html) => snapshot.html = Some(html.clone()),
                Representation::Url(url) => snapshot.url = Some(url.clone()),
                Representation::Text(text) => snapshot.text = Some(text.clone()),
                Representation::Image(bytes) => snapshot.image = Some(bytes.clone()),
                Representation::FileList(paths) => snapshot.file_list = Some(paths.clone()),
            }
        }

        let mut state = self.state.lock();
        state.generation += 1;
        state.writes += 1;
        snapshot.generation = state.generation;
        state.snapshot = snapshot;
        debug!(generation = state.generation, types = ?write.type_names(), "Wrote to memory clipboard");
        Ok(Some(state.generation))
    }
}

// ============================================================================
// System clipboard
// ============================================================================

/// Content-fingerprint generation for platforms without a change counter.
#[derive(Debug, Default)]
struct FallbackGeneration {
    fingerprint: Option<String>,
    generation: i64,
}

/// The OS clipboard.
#[derive(Debug, Default)]
pub struct SystemClipboard {
    fallback: Mutex<FallbackGeneration>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn open() -> Result<arboard::Clipboard> {
        arboard::Clipboard::new().context("Failed to open system clipboard")
    }

    /// Read plain text and image through arboard.
    fn read_common(clipboard: &mut arboard::Clipboard, snapshot: &mut ClipboardSnapshot) {
        match clipboard.get_text() {
            Ok(text) => snapshot.text = Some(text),
            Err(arboard::Error::ContentNotAvailable) => {}
            Err(e) => debug!(error = %e, "Clipboard text unavailable"),
        }

        match clipboard.get_image() {
            Ok(img) => match super::image::encode_rgba_to_png(
                img.width as u32,
                img.height as u32,
                img.bytes.into_owned(),
            ) {
                Ok(png) => snapshot.image = Some(png),
                Err(e) => debug!(error = %e, "Failed to encode clipboard image"),
            },
            Err(arboard::Error::ContentNotAvailable) => {}
            Err(e) => debug!(error = %e, "Clipboard image unavailable"),
        }
    }

    /// Fingerprint of the current contents for the fallback generation.
    #[cfg(not(target_os = "macos"))]
    fn fingerprint(clipboard: &mut arboard::Clipboard) -> String {
        use super::dedup::{compute_content_hash, IMAGE_HASH_PREFIX_LEN};

        let mut buf = Vec::new();
        if let Ok(text) = clipboard.get_text() {
            buf.extend_from_slice(b"t:");
            buf.extend_from_slice(text.as_bytes());
        }
        if let Ok(img) = clipboard.get_image() {
            buf.extend_from_slice(format!("i:{}x{}:", img.width, img.height).as_bytes());
            buf.extend_from_slice(&img.bytes[..img.bytes.len().min(IMAGE_HASH_PREFIX_LEN)]);
        }
        compute_content_hash(&buf)
    }

    #[cfg(not(target_os = "macos"))]
    fn write_with_arboard(&self, write: &ClipboardWrite) -> Result<Option<i64>> {
        let mut clipboard = Self::open()?;
        let plain = write.plain_text().map(str::to_string);

        let mut written = false;
        for rep in &write.representations {
            match rep {
                Representation::Image(bytes) => {
                    let (width, height, rgba) = super::image::decode_to_rgba(bytes)?;
                    clipboard
                        .set_image(arboard::ImageData {
                            width: width as usize,
                            height: height as usize,
                            bytes: rgba.into(),
                        })
                        .context("Failed to write image to clipboard")?;
                }
                Representation::Html(html) => clipboard
                    .set_html(html.as_str(), plain.as_deref())
                    .context("Failed to write HTML to clipboard")?,
                Representation::Text(text) | Representation::Url(text) => clipboard
                    .set_text(text.as_str())
                    .context("Failed to write text to clipboard")?,
                Representation::FileList(paths) => clipboard
                    .set_text(paths.join("\n"))
                    .context("Failed to write file list to clipboard")?,
                // arboard has no RTF target; the plain/HTML fallbacks carry it.
                Representation::Rtf(_) => continue,
            }
            written = true;
            // arboard replaces contents on every set, keep the richest one.
            break;
        }
        if !written {
            anyhow::bail!("Nothing writable in clipboard request");
        }

        let fingerprint = Self::fingerprint(&mut clipboard);
        let mut fallback = self.fallback.lock();
        fallback.generation += 1;
        fallback.fingerprint = Some(fingerprint);
        Ok(Some(fallback.generation))
    }
}

impl ClipboardBoundary for SystemClipboard {
    #[cfg(target_os = "macos")]
    fn current_generation(&self) -> Option<i64> {
        super::change_detection::get_pasteboard_change_count()
    }

    #[cfg(not(target_os = "macos"))]
    fn current_generation(&self) -> Option<i64> {
        let mut clipboard = Self::open().ok()?;
        let fingerprint = Self::fingerprint(&mut clipboard);
        let mut fallback = self.fallback.lock();
        if fallback.fingerprint.as_deref() != Some(fingerprint.as_str()) {
            fallback.fingerprint = Some(fingerprint);
            fallback.generation += 1;
        }
        Some(fallback.generation)
    }

    fn read_snapshot(&self) -> Result<ClipboardSnapshot> {
        let mut clipboard = Self::open()?;
        let mut snapshot = ClipboardSnapshot {
            generation: self.current_generation().unwrap_or_default(),
            ..Default::default()
        };
        Self::read_common(&mut clipboard, &mut snapshot);

        #[cfg(target_os = "macos")]
        macos::read_extras(&mut snapshot);

        Ok(snapshot)
    }

    #[cfg(target_os = "macos")]
    fn write(&self, write: &ClipboardWrite) -> Result<Option<i64>> {
        macos::write_representations(write)?;
        Ok(super::change_detection::get_pasteboard_change_count())
    }

    #[cfg(not(target_os = "macos"))]
    fn write(&self, write: &ClipboardWrite) -> Result<Option<i64>> {
        self.write_with_arboard(write)
    }
}

#[cfg(target_os = "macos")]
mod macos {
    //! NSPasteboard access for what arboard does not expose.

    use anyhow::{bail, Result};
    use objc::runtime::{Class, Object, BOOL, NO};
    use objc::{msg_send, sel, sel_impl};
    use std::ffi::{CStr, CString};

    use crate::clipboard_history::snapshot::{ClipboardSnapshot, ClipboardWrite, Representation};

    const TYPE_HTML: &str = "public.html";
    const TYPE_RTF: &str = "public.rtf";
    const TYPE_URL: &str = "public.url";
    const TYPE_FILE_URL: &str = "public.file-url";
    const TYPE_TEXT: &str = "public.utf8-plain-text";
    const TYPE_PNG: &str = "public.png";
    const TYPE_CONCEALED: &str = "org.nspasteboard.ConcealedType";
    const TYPE_TRANSIENT: &str = "org.nspasteboard.TransientType";
    const TYPE_AUTO_GENERATED: &str = "org.nspasteboard.AutoGeneratedType";

    unsafe fn general_pasteboard() -> Option<*mut Object> {
        let class = Class::get("NSPasteboard")?;
        let pb: *mut Object = msg_send![class, generalPasteboard];
        (!pb.is_null()).then_some(pb)
    }

    unsafe fn nsstring(s: &str) -> Option<*mut Object> {
        let class = Class::get("NSString")?;
        let cstr = CString::new(s).ok()?;
        let ns: *mut Object = msg_send![class, stringWithUTF8String: cstr.as_ptr()];
        (!ns.is_null()).then_some(ns)
    }

    unsafe fn get_nsstring(ns: *mut Object) -> Option<String> {
        if ns.is_null() {
            return None;
        }
        let utf8: *const std::os::raw::c_char = msg_send![ns, UTF8String];
        if utf8.is_null() {
            return None;
        }
        CStr::from_ptr(utf8).to_str().ok().map(|s| s.to_string())
    }

    unsafe fn string_for_type(target: *mut Object, ty: &str) -> Option<String> {
        let ty = nsstring(ty)?;
        get_nsstring(msg_send![target, stringForType: ty])
    }

    unsafe fn data_for_type(pb: *mut Object, ty: &str) -> Option<Vec<u8>> {
        let ty = nsstring(ty)?;
        let data: *mut Object = msg_send![pb, dataForType: ty];
        if data.is_null() {
            return None;
        }
        let len: usize = msg_send![data, length];
        let ptr: *const u8 = msg_send![data, bytes];
        if ptr.is_null() || len == 0 {
            return None;
        }
        Some(std::slice::from_raw_parts(ptr, len).to_vec())
    }

    unsafe fn pasteboard_types(pb: *mut Object) -> Vec<String> {
        let types: *mut Object = msg_send![pb, types];
        if types.is_null() {
            return Vec::new();
        }
        let count: usize = msg_send![types, count];
        (0..count)
            .filter_map(|i| get_nsstring(msg_send![types, objectAtIndex: i]))
            .collect()
    }

    unsafe fn file_paths(pb: *mut Object) -> Vec<String> {
        let items: *mut Object = msg_send![pb, pasteboardItems];
        if items.is_null() {
            return Vec::new();
        }
        let count: usize = msg_send![items, count];
        (0..count)
            .filter_map(|i| {
                let item: *mut Object = msg_send![items, objectAtIndex: i];
                string_for_type(item, TYPE_FILE_URL)
            })
            .filter_map(|raw| url::Url::parse(&raw).ok()?.to_file_path().ok())
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }

    /// Fill in HTML, RTF, URL, file list and the nspasteboard.org markers.
    pub(super) fn read_extras(snapshot: &mut ClipboardSnapshot) {
        unsafe {
            let Some(pb) = general_pasteboard() else {
                return;
            };
            let types = pasteboard_types(pb);
            let has = |t: &str| types.iter().any(|x| x == t);

            snapshot.concealed = has(TYPE_CONCEALED);
            snapshot.transient = has(TYPE_TRANSIENT) || has(TYPE_AUTO_GENERATED);
            if has(TYPE_HTML) {
                snapshot.html = string_for_type(pb, TYPE_HTML);
            }
            if has(TYPE_RTF) {
                snapshot.rtf = data_for_type(pb, TYPE_RTF);
            }
            if has(TYPE_URL) {
                snapshot.url = string_for_type(pb, TYPE_URL);
            }
            if has(TYPE_FILE_URL) {
                let paths = file_paths(pb);
                if !paths.is_empty() {
                    snapshot.file_list = Some(paths);
                }
            }
        }
    }

    unsafe fn set_string(pb: *mut Object, value: &str, ty: &str) -> bool {
        let (Some(value), Some(ty)) = (nsstring(value), nsstring(ty)) else {
            return false;
        };
        let ok: BOOL = msg_send![pb, setString: value forType: ty];
        ok != NO
    }

    unsafe fn set_data(pb: *mut Object, bytes: &[u8], ty: &str) -> bool {
        let (Some(class), Some(ty)) = (Class::get("NSData"), nsstring(ty)) else {
            return false;
        };
        let data: *mut Object =
            msg_send![class, dataWithBytes: bytes.as_ptr() as *const std::ffi::c_void length: bytes.len()];
        if data.is_null() {
            return false;
        }
        let ok: BOOL = msg_send![pb, setData: data forType: ty];
        ok != NO
    }

    unsafe fn write_file_urls(pb: *mut Object, paths: &[String]) -> bool {
        let (Some(url_class), Some(array_class)) = (Class::get("NSURL"), Class::get("NSArray"))
        else {
            return false;
        };
        let urls: Vec<*mut Object> = paths
            .iter()
            .filter_map(|p| nsstring(p))
            .map(|p| {
                let url: *mut Object = msg_send![url_class, fileURLWithPath: p];
                url
            })
            .filter(|u| !u.is_null())
            .collect();
        if urls.is_empty() {
            return false;
        }
        let array: *mut Object =
            msg_send![array_class, arrayWithObjects: urls.as_ptr() count: urls.len()];
        let ok: BOOL = msg_send![pb, writeObjects: array];
        ok != NO
    }

    pub(super) fn write_representations(write: &ClipboardWrite) -> Result<()> {
        unsafe {
            let Some(pb) = general_pasteboard() else {
                bail!("NSPasteboard unavailable");
            };
            let _: i64 = msg_send![pb, clearContents];

            let mut any = false;
            for rep in &write.representations {
                any |= match rep {
                    Representation::Rtf(bytes) => set_data(pb, bytes, TYPE_RTF),
                    Representation::Html(html) => set_string(pb, html, TYPE_HTML),
                    Representation::Url(url) => set_string(pb, url, TYPE_URL),
                    Representation::Text(text) => set_string(pb, text, TYPE_TEXT),
                    Representation::Image(png) => set_data(pb, png, TYPE_PNG),
                    Representation::FileList(paths) => write_file_urls(pb, paths),
                };
            }
            if !any {
                bail!("Pasteboard rejected every representation");
            }
        }
        Ok(())
    }
}


#[cfg(all(test, feature = "system-tests"))]
mod system_tests {
    use super::*;

    #[test]
    fn test_system_clipboard_text_roundtrip() {
        let clipboard = SystemClipboard::new();
        let write = ClipboardWrite::new(vec![Representation::Text("clipkeep system test".into())]);
        let generation = clipboard.write(&write).unwrap();
        assert!(generation.is_some());

        let snapshot = clipboard.read_snapshot().unwrap();
        assert_eq!(snapshot.text.as_deref(), Some("clipkeep system test"));
    }
}
