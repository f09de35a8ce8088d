//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Directory holding the database, assets, logs and config file
pub const DEFAULT_DATA_DIR: &str = "~/.clipkeep";

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DATABASE_FILE_NAME: &str = "history.sqlite";
pub const ASSETS_DIR_NAME: &str = "assets";
pub const LOGS_DIR_NAME: &str = "logs";

/// Clipboard poll interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Floor for user-configured poll intervals
pub const MIN_POLL_INTERVAL_MS: u64 = 50;

/// History retention in days (0 = forever)
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Lifetime of concealed items (password manager copies)
pub const DEFAULT_CONCEALED_TTL_SECS: u64 = 60;

/// Default max text length for clipboard history entries (bytes)
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 100_000;

/// Delay before the synthesized paste keystroke
pub const DEFAULT_PASTE_DELAY_MS: u64 = 250;

/// Image asset limits (pixels)
pub const DEFAULT_MAX_IMAGE_EDGE: u32 = 3840;
pub const DEFAULT_THUMBNAIL_EDGE: u32 = 200;
