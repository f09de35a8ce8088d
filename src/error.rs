use thiserror::Error;
use tracing::{error, warn};

/// Error severity for surfacing to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,     // benign, nothing to report
    Warning,  // recoverable, degraded
    Error,    // operation failed
    Critical, // requires user action
}

/// Errors raised by the history store.
///
/// `Conflict` is the benign outcome of inserting a content hash that is
/// already live; callers roll back and treat it as a discarded duplicate.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Item with content hash {hash} already exists")]
    Conflict { hash: String },

    #[error("Item {0} not found")]
    NotFound(String),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors raised while importing or exporting history documents.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Unsupported export version {0}")]
    UnsupportedVersion(u64),

    #[error("Export document has no version field")]
    MissingVersion,

    #[error("Failed to decode export document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Store failure during transfer: {0}")]
    Store(#[from] StoreError),

    #[error("Transfer I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the image asset pipeline.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Image has no pixels")]
    Empty,

    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Asset I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for the `clipkeep` binary and engine entry points.
#[derive(Error, Debug)]
pub enum ClipKeepError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),

    #[error("Engine is not running")]
    EngineStopped,
}

impl ClipKeepError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Store(StoreError::Conflict { .. }) => ErrorSeverity::Info,
            Self::Store(_) => ErrorSeverity::Error,
            Self::Transfer(TransferError::Store(_)) => ErrorSeverity::Error,
            Self::Transfer(_) => ErrorSeverity::Warning,
            Self::Asset(_) => ErrorSeverity::Warning,
            Self::Config(_) => ErrorSeverity::Warning,
            Self::Clipboard(_) => ErrorSeverity::Error,
            Self::EngineStopped => ErrorSeverity::Critical,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Store(StoreError::Conflict { .. }) => "Item is already in history".to_string(),
            Self::Store(e) => format!("History database problem: {}", e),
            Self::Transfer(TransferError::UnsupportedVersion(v)) => {
                format!("This export was made by a newer version (format {})", v)
            }
            Self::Transfer(TransferError::MissingVersion) => {
                "File is not a clipboard history export".to_string()
            }
            Self::Transfer(e) => format!("Import/export failed: {}", e),
            Self::Asset(e) => format!("Image could not be stored: {}", e),
            Self::Config(msg) => format!("Configuration issue: {}", msg),
            Self::Clipboard(msg) => format!("Could not access the clipboard: {}", msg),
            Self::EngineStopped => "Clipboard history has stopped".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClipKeepError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and nobody is waiting on the result.
///
/// ```ignore
/// use clipkeep::error::ResultExt;
///
/// store.run_maintenance(false).warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}

/// Panic in debug mode, log error in release mode.
///
/// For states that should crash during development but degrade in production.
#[macro_export]
macro_rules! debug_panic {
    ( $($fmt_arg:tt)* ) => {
        if cfg!(debug_assertions) {
            panic!( $($fmt_arg)* );
        } else {
            tracing::error!("IMPOSSIBLE STATE: {}", format_args!($($fmt_arg)*));
        }
    };
}
