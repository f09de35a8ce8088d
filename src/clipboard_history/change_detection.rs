//! Clipboard change detection
//!
//! Cheap generation polling plus the self-write suppression marker.
//! On macOS the generation is NSPasteboard's changeCount, an integer read
//! that never touches the payload.

#[cfg(target_os = "macos")]
use objc::sel;
#[cfg(target_os = "macos")]
use objc::sel_impl;

use tracing::debug;

/// Get the current clipboard change count.
///
/// Reads NSPasteboard.generalPasteboard.changeCount. Returns None on other
/// platforms.
#[cfg(target_os = "macos")]
pub fn get_pasteboard_change_count() -> Option<i64> {
    use cocoa::appkit::NSPasteboard;
    use cocoa::base::nil;
    use objc::runtime::Object;

    unsafe {
        let pasteboard: *mut Object = NSPasteboard::generalPasteboard(nil);
        if pasteboard.is_null() {
            return None;
        }

        // changeCount is an NSInteger (i64 on 64-bit)
        let change_count: i64 = objc::msg_send![pasteboard, changeCount];
        Some(change_count)
    }
}

#[cfg(not(target_os = "macos"))]
pub fn get_pasteboard_change_count() -> Option<i64> {
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationChange {
    Unchanged,
    Changed { previous: Option<i64>, current: i64 },
}

/// Marker set by paste-back so the poller skips our own clipboard write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelfWriteSuppression {
    #[default]
    Idle,
    /// Skip the next observed change, whatever its generation.
    NextChange,
    /// Skip only the change whose generation matches what our write produced.
    Generation(i64),
}

/// Tracks the last seen generation and the suppression marker.
///
/// The first observation always counts as a change so whatever is on the
/// clipboard at start-up gets a chance to be captured.
#[derive(Debug, Default)]
pub struct ClipboardChangeDetector {
    last_seen_generation: Option<i64>,
    suppression: SelfWriteSuppression,
}

impl ClipboardChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` and report whether it differs from the last one seen.
    pub fn observe(&mut self, current: i64) -> GenerationChange {
        let previous = self.last_seen_generation;
        if previous == Some(current) {
            return GenerationChange::Unchanged;
        }

        debug!(
            old_count = previous,
            new_count = current,
            "Clipboard change detected via generation"
        );
        self.last_seen_generation = Some(current);
        GenerationChange::Changed { previous, current }
    }

    /// Arm suppression after we wrote to the clipboard.
    ///
    /// `written_generation` is the generation our write produced, when the
    /// boundary can report it.
    pub fn arm_suppression(&mut self, written_generation: Option<i64>) {
        self.suppression = match written_generation {
            Some(generation) => SelfWriteSuppression::Generation(generation),
            None => SelfWriteSuppression::NextChange,
        };
        debug!(suppression = ?self.suppression, "Armed self-write suppression");
    }

    /// Consume the marker for an observed change. Returns true if the change
    /// is our own write and must not be captured.
    ///
    /// A change past the expected generation means someone else wrote after
    /// us; the marker is cleared and the change is processed normally.
    pub fn consume_suppression(&mut self, observed: i64) -> bool {
        match self.suppression {
            SelfWriteSuppression::Idle => false,
            SelfWriteSuppression::NextChange => {
                self.suppression = SelfWriteSuppression::Idle;
                true
            }
            SelfWriteSuppression::Generation(expected) if observed == expected => {
                self.suppression = SelfWriteSuppression::Idle;
                true
            }
            SelfWriteSuppression::Generation(expected) if observed > expected => {
                debug!(expected, observed, "External write superseded ours, clearing suppression");
                self.suppression = SelfWriteSuppression::Idle;
                false
            }
            SelfWriteSuppression::Generation(_) => false,
        }
    }

    pub fn is_suppression_armed(&self) -> bool {
        self.suppression != SelfWriteSuppression::Idle
    }

    pub fn last_seen_generation(&self) -> Option<i64> {
        self.last_seen_generation
    }

    /// Forget the last generation; the next observation counts as a change.
    pub fn reset(&mut self) {
        self.last_seen_generation = None;
    }
}
