//! ClipKeep - clipboard history capture engine
//!
//! Watches the system clipboard, stores what it sees in a local SQLite
//! history and writes items back on request.

pub mod clipboard_history;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod scheduler;
pub mod stdin_commands;
