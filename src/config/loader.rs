//! Configuration loading from file system

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::defaults::{CONFIG_FILE_NAME, DEFAULT_DATA_DIR, LOGS_DIR_NAME};
use super::types::Config;

/// Path of the config file: ~/.clipkeep/config.json
pub fn config_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_DATA_DIR).as_ref()).join(CONFIG_FILE_NAME)
}

/// Log directory used before any config is read: ~/.clipkeep/logs
pub fn default_logs_dir() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_DATA_DIR).as_ref()).join(LOGS_DIR_NAME)
}

/// Load configuration from ~/.clipkeep/config.json
///
/// Returns Config::default() if the file is missing or invalid.
#[instrument(name = "load_config")]
pub fn load_config() -> Config {
    load_config_from(&config_path())
}

/// Load configuration from `path`, falling back to defaults with a logged
/// reason.
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Config::default();
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read config, using defaults");
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&contents) {
        Ok(config) => {
            info!(path = %path.display(), "Successfully loaded config");
            config
        }
        Err(e) => {
            // Field names are camelCase; snake_case keys are the usual mistake.
            let hint = if contents.contains('_') {
                "Config keys are camelCase, e.g. \"retentionDays\""
            } else {
                ""
            };
            warn!(
                path = %path.display(),
                error = %e,
                hint = %hint,
                "Failed to parse config JSON, using defaults"
            );
            Config::default()
        }
    }
}
