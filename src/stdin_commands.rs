//! External command handling via stdin.
//!
//! While `clipkeep run` is up, the engine can be driven with JSONL commands,
//! one per line. This is primarily used for testing and automation.
//!
//! # Protocol
//!
//! ```json
//! {"type": "paste", "id": "…"}
//! {"type": "paste", "id": "…", "writeOnly": true, "plain": true}
//! {"type": "delete", "id": "…"}
//! {"type": "enrich", "id": "…", "enrichment": {"urlTitle": "Release notes"}}
//! {"type": "export", "path": "/tmp/history.json"}
//! {"type": "import", "path": "/tmp/history.json"}
//! {"type": "wake"}
//! {"type": "quit"}
//! ```
//!
//! A bare `quit` line also stops the daemon.
//!
//! All commands except `quit` accept an optional `requestId` that is logged
//! with the outcome.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use tracing::{debug, info, warn};

use crate::clipboard_history::{EngineHandle, EngineMessage, Enrichment, ItemId, PasteMode};
use crate::error::ClipKeepError;

/// Commands that can be sent to the daemon via stdin
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExternalCommand {
    /// Write an item back to the clipboard, and paste it unless `writeOnly`
    #[serde(rename_all = "camelCase")]
    Paste {
        id: String,
        #[serde(default)]
        write_only: bool,
        /// Paste as plain text only
        #[serde(default)]
        plain: bool,
        #[serde(default)]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Delete {
        id: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Enrich {
        id: String,
        enrichment: Enrichment,
        #[serde(default)]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Export {
        path: PathBuf,
        #[serde(default)]
        request_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Import {
        path: PathBuf,
        #[serde(default)]
        request_id: Option<String>,
    },
    /// The machine woke from sleep
    Wake,
    Quit,
}

impl ExternalCommand {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Paste { request_id, .. }
            | Self::Delete { request_id, .. }
            | Self::Enrich { request_id, .. }
            | Self::Export { request_id, .. }
            | Self::Import { request_id, .. } => request_id.as_deref(),
            Self::Wake | Self::Quit => None,
        }
    }
}

/// Parse one JSONL command. A bare `quit` line is accepted for interactive use.
pub fn parse_command(line: &str) -> Result<ExternalCommand, serde_json::Error> {
    if line.trim() == "quit" {
        return Ok(ExternalCommand::Quit);
    }
    serde_json::from_str(line)
}

/// Spawn a thread that reads stdin and forwards parsed commands.
///
/// The receiver disconnects when stdin closes.
pub fn start_stdin_listener() -> Receiver<ExternalCommand> {
    // Bounded: commands arrive far slower than the daemon handles them
    let (tx, rx) = mpsc::sync_channel(100);

    let spawned = std::thread::Builder::new()
        .name("clipkeep-stdin".to_string())
        .spawn(move || {
            debug!("External command listener started");
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) if !line.trim().is_empty() => match parse_command(&line) {
                        Ok(cmd) => {
                            debug!(command = ?cmd, "Parsed command");
                            if tx.send(cmd).is_err() {
                                debug!("Command channel closed, exiting");
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, line = %line, "Failed to parse command"),
                    },
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Error reading stdin");
                        break;
                    }
                }
            }
            debug!("External command listener exiting");
        });

    if let Err(e) = spawned {
        warn!(error = %e, "Failed to spawn stdin listener");
    }

    rx
}

/// Run one command against the engine. Returns `false` when the daemon
/// should exit.
pub fn dispatch(command: ExternalCommand, engine: &EngineHandle) -> Result<bool, ClipKeepError> {
    let request_id = command.request_id().map(str::to_string);
    match command {
        ExternalCommand::Paste {
            id,
            write_only,
            plain,
            ..
        } => {
            let mode = if write_only {
                PasteMode::WriteOnly
            } else {
                PasteMode::WriteAndPaste
            };
            match engine.paste(ItemId::from(id.clone()), mode, plain) {
                Ok(outcome) => info!(?request_id, %id, ?outcome, "Paste handled"),
                Err(e) => warn!(?request_id, %id, error = %e, "Paste failed"),
            }
        }
        ExternalCommand::Delete { id, .. } => {
            let deleted = engine.delete(ItemId::from(id.clone()))?;
            info!(?request_id, %id, deleted, "Delete handled");
        }
        ExternalCommand::Enrich { id, enrichment, .. } => {
            engine.send(EngineMessage::Enrich {
                id: ItemId::from(id),
                enrichment,
            })?;
        }
        ExternalCommand::Export { path, .. } => {
            let count = engine.export(path.clone())?;
            info!(?request_id, path = %path.display(), count, "Export handled");
        }
        ExternalCommand::Import { path, .. } => {
            let report = engine.import(path.clone())?;
            info!(
                ?request_id,
                path = %path.display(),
                imported = report.imported,
                skipped = report.skipped,
                "Import handled"
            );
        }
        ExternalCommand::Wake => engine.wake()?,
        ExternalCommand::Quit => return Ok(false),
    }
    Ok(true)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paste_defaults_to_keystroke() {
        let cmd = parse_command(r#"{"type": "paste", "id": "abc"}"#).unwrap();
        assert_eq!(
            cmd,
            ExternalCommand::Paste {
                id: "abc".to_string(),
                write_only: false,
                plain: false,
                request_id: None,
            }
        );
    }

    #[test]
    fn test_paste_write_only_plain_with_request_id() {
        let cmd = parse_command(
            r#"{"type": "paste", "id": "abc", "writeOnly": true, "plain": true, "requestId": "req-1"}"#,
        )
        .unwrap();
        match &cmd {
            ExternalCommand::Paste {
                write_only, plain, ..
            } => {
                assert!(*write_only);
                assert!(*plain);
            }
            _ => panic!("Expected Paste command"),
        }
        assert_eq!(cmd.request_id(), Some("req-1"));
    }

    #[test]
    fn test_enrich_deserialization() {
        let cmd =
            parse_command(r#"{"type": "enrich", "id": "abc", "enrichment": {"urlTitle": "Docs"}}"#)
                .unwrap();
        match cmd {
            ExternalCommand::Enrich { id, enrichment, .. } => {
                assert_eq!(id, "abc");
                assert_eq!(enrichment.url_title.as_deref(), Some("Docs"));
            }
            _ => panic!("Expected Enrich command"),
        }
    }

    #[test]
    fn test_export_and_import_paths() {
        let export = parse_command(r#"{"type": "export", "path": "/tmp/out.json"}"#).unwrap();
        assert!(
            matches!(export, ExternalCommand::Export { ref path, .. } if path == &PathBuf::from("/tmp/out.json"))
        );
        let import = parse_command(r#"{"type": "import", "path": "/tmp/in.json"}"#).unwrap();
        assert!(matches!(import, ExternalCommand::Import { .. }));
    }

    #[test]
    fn test_unit_commands() {
        assert_eq!(parse_command(r#"{"type": "wake"}"#).unwrap(), ExternalCommand::Wake);
        assert_eq!(parse_command(r#"{"type": "quit"}"#).unwrap(), ExternalCommand::Quit);
        assert_eq!(parse_command("  quit  ").unwrap(), ExternalCommand::Quit);
        assert_eq!(ExternalCommand::Quit.request_id(), None);
    }

    #[test]
    fn test_unknown_and_incomplete_commands_fail() {
        assert!(parse_command(r#"{"type": "unknown"}"#).is_err());
        assert!(parse_command(r#"{"type": "delete"}"#).is_err(), "delete requires id");
        assert!(parse_command("not json").is_err());
    }
}
