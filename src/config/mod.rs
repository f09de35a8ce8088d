//! Configuration module - engine settings
//!
//! This module provides functionality for:
//! - Loading configuration from ~/.clipkeep/config.json
//! - Default values for all settings
//! - The Config type and its derived settings
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - The Config struct and its getters
//! - `loader` - File system loading and parsing

mod defaults;
mod loader;
mod types;

pub use defaults::{DEFAULT_DATA_DIR, DEFAULT_MAX_TEXT_LENGTH, DEFAULT_RETENTION_DAYS};
pub use loader::{config_path, default_logs_dir, load_config, load_config_from};
pub use types::Config;

#[cfg(test)]
pub use defaults::{
    DEFAULT_CONCEALED_TTL_SECS, DEFAULT_MAX_IMAGE_EDGE, DEFAULT_PASTE_DELAY_MS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_THUMBNAIL_EDGE, MIN_POLL_INTERVAL_MS,
};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
