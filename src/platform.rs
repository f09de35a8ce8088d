//! Platform integrations for the engine's OS boundaries
//!
//! - [`SystemPermissions`]: accessibility trust and secure keyboard entry
//! - [`SystemInputSynthesizer`]: Cmd+V via Core Graphics events
//! - [`FrontmostAppProvider`]: the app that owns the menu bar at capture time
//! - [`HeadlessSurface`]: no window to hide when running from the CLI
//!
//! Everything here is macOS-backed. On other platforms the permission check
//! reports "not permitted", so a write-and-paste request returns
//! `PermissionRequired` without touching the clipboard. Only write-only
//! pastes work there.

use anyhow::Result;
use tracing::debug;

use crate::clipboard_history::{
    InputSynthesizer, PermissionBoundary, PresentingSurface, SourceApp, SourceAppProvider,
};

// ============================================================================
// Permissions
// ============================================================================

#[cfg(target_os = "macos")]
#[link(name = "Carbon", kind = "framework")]
extern "C" {
    fn IsSecureEventInputEnabled() -> bool;
}

/// Live permission checks. Nothing is cached: the user can revoke
/// accessibility access at any time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPermissions;

impl PermissionBoundary for SystemPermissions {
    #[cfg(target_os = "macos")]
    fn is_input_synthesis_permitted(&self) -> bool {
        let trusted = macos_accessibility_client::accessibility::application_is_trusted();
        debug!(trusted, "Checked accessibility permission");
        trusted
    }

    #[cfg(not(target_os = "macos"))]
    fn is_input_synthesis_permitted(&self) -> bool {
        false
    }

    #[cfg(target_os = "macos")]
    fn is_secure_input_active(&self) -> bool {
        // SAFETY: takes no arguments and only reads global input state.
        unsafe { IsSecureEventInputEnabled() }
    }

    #[cfg(not(target_os = "macos"))]
    fn is_secure_input_active(&self) -> bool {
        false
    }
}

// ============================================================================
// Keystroke synthesis
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInputSynthesizer;

impl InputSynthesizer for SystemInputSynthesizer {
    #[cfg(target_os = "macos")]
    fn synthesize_paste(&self) -> Result<()> {
        use anyhow::Context;
        use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, CGKeyCode};
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
        use std::thread;
        use std::time::Duration;

        // 'v' on an ANSI layout
        const KEY_V: CGKeyCode = 9;

        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .ok()
            .context("Failed to create CGEventSource")?;

        let key_down = CGEvent::new_keyboard_event(source.clone(), KEY_V, true)
            .ok()
            .context("Failed to create key down event")?;
        key_down.set_flags(CGEventFlags::CGEventFlagCommand);

        let key_up = CGEvent::new_keyboard_event(source, KEY_V, false)
            .ok()
            .context("Failed to create key up event")?;
        key_up.set_flags(CGEventFlags::CGEventFlagCommand);

        key_down.post(CGEventTapLocation::HID);
        thread::sleep(Duration::from_millis(5));
        key_up.post(CGEventTapLocation::HID);

        debug!("Posted Cmd+V");
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    fn synthesize_paste(&self) -> Result<()> {
        anyhow::bail!("Paste keystroke synthesis is only supported on macOS")
    }
}

// ============================================================================
// Presenting surface
// ============================================================================

/// Surface used when no picker window exists (CLI and daemon mode).
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSurface;

impl PresentingSurface for HeadlessSurface {
    fn hide(&self) {
        debug!("No surface to hide");
    }
}

// ============================================================================
// Source app
// ============================================================================

/// Reads the menu-bar-owning application from NSWorkspace. Falls back to
/// `frontmostApplication` when no app owns the menu bar.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrontmostAppProvider;

impl SourceAppProvider for FrontmostAppProvider {
    #[cfg(target_os = "macos")]
    fn frontmost_app(&self) -> Option<SourceApp> {
        // SAFETY: NSWorkspace accessors are thread-safe reads; every pointer
        // is null-checked before use.
        unsafe { macos::frontmost_app() }
    }

    #[cfg(not(target_os = "macos"))]
    fn frontmost_app(&self) -> Option<SourceApp> {
        None
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use objc::runtime::{Class, Object};
    use objc::{msg_send, sel, sel_impl};
    use std::ffi::CStr;

    use crate::clipboard_history::SourceApp;

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

    pub(super) unsafe fn frontmost_app() -> Option<SourceApp> {
        let class = Class::get("NSWorkspace")?;
        let workspace: *mut Object = msg_send![class, sharedWorkspace];
        if workspace.is_null() {
            return None;
        }

        let mut app: *mut Object = msg_send![workspace, menuBarOwningApplication];
        if app.is_null() {
            app = msg_send![workspace, frontmostApplication];
        }
        if app.is_null() {
            return None;
        }

        let bundle_id = get_nsstring(msg_send![app, bundleIdentifier])?;
        let name = get_nsstring(msg_send![app, localizedName]).unwrap_or_else(|| bundle_id.clone());
        Some(SourceApp { bundle_id, name })
    }
}
