//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;
use crate::clipboard_history::{ClassifierLimits, ImageLimits, RetentionPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Clipboard poll interval in milliseconds (default: 500)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Days of history to keep. 0 = forever. (default: 30)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Seconds before a concealed item is deleted (default: 60)
    #[serde(default = "default_concealed_ttl_secs")]
    pub concealed_ttl_secs: u64,
    /// Maximum text length for history entries (bytes). 0 = no limit.
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    /// Delay before the paste keystroke in milliseconds (default: 250)
    #[serde(default = "default_paste_delay_ms")]
    pub paste_delay_ms: u64,
    #[serde(default = "default_max_image_edge")]
    pub max_image_edge: u32,
    #[serde(default = "default_thumbnail_edge")]
    pub thumbnail_edge: u32,
    /// Override for the data directory. `~` is expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}
fn default_concealed_ttl_secs() -> u64 {
    DEFAULT_CONCEALED_TTL_SECS
}
fn default_max_text_length() -> usize {
    DEFAULT_MAX_TEXT_LENGTH
}
fn default_paste_delay_ms() -> u64 {
    DEFAULT_PASTE_DELAY_MS
}
fn default_max_image_edge() -> u32 {
    DEFAULT_MAX_IMAGE_EDGE
}
fn default_thumbnail_edge() -> u32 {
    DEFAULT_THUMBNAIL_EDGE
}

impl Default for Config {
    fn default() -> Self {
        Config {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retention_days: DEFAULT_RETENTION_DAYS,
            concealed_ttl_secs: DEFAULT_CONCEALED_TTL_SECS,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            paste_delay_ms: DEFAULT_PASTE_DELAY_MS,
            max_image_edge: DEFAULT_MAX_IMAGE_EDGE,
            thumbnail_edge: DEFAULT_THUMBNAIL_EDGE,
            data_dir: None, // Will use DEFAULT_DATA_DIR via getter
        }
    }
}

impl Config {
    /// Poll interval, never below MIN_POLL_INTERVAL_MS
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn concealed_ttl(&self) -> Duration {
        Duration::from_secs(self.concealed_ttl_secs)
    }

    pub fn paste_delay(&self) -> Duration {
        Duration::from_millis(self.paste_delay_ms)
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::from_days(self.retention_days)
    }

    /// Classifier limits; a max text length of 0 means unlimited
    pub fn classifier_limits(&self) -> ClassifierLimits {
        ClassifierLimits {
            max_text_len: match self.max_text_length {
                0 => usize::MAX,
                n => n,
            },
        }
    }

    /// Image limits, with zero edges falling back to defaults
    pub fn image_limits(&self) -> ImageLimits {
        let nonzero = |value: u32, fallback: u32| if value == 0 { fallback } else { value };
        ImageLimits {
            max_edge: nonzero(self.max_image_edge, DEFAULT_MAX_IMAGE_EDGE),
            thumbnail_edge: nonzero(self.thumbnail_edge, DEFAULT_THUMBNAIL_EDGE),
        }
    }

    /// Returns the data directory with `~` expanded
    pub fn data_dir(&self) -> PathBuf {
        let raw = self.data_dir.as_deref().unwrap_or(DEFAULT_DATA_DIR);
        PathBuf::from(shellexpand::tilde(raw).as_ref())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(DATABASE_FILE_NAME)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir().join(ASSETS_DIR_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir().join(LOGS_DIR_NAME)
    }
}
