use std::{fmt, io, path::StripPrefixError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[cfg(feature = "service")]
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};

/// Reasons a bulk edit is refused before any document is touched.
///
/// These are user-actionable outcomes rather than failures of the engine: the caller is expected
/// to surface them as-is (for example as a notice) and let the user correct the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkEditRejection {
    /// No property key was selected.
    NoKey,
    /// The preview matched no blocks.
    NoMatches,
    /// No replacement value was supplied.
    NoNewValue,
    /// The replacement value equals the current-value filter.
    Unchanged,
}

impl fmt::Display for BulkEditRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkEditRejection::NoKey => write!(f, "Please select a property key"),
            BulkEditRejection::NoMatches => write!(f, "Nothing to update"),
            BulkEditRejection::NoNewValue => write!(f, "Please enter a new value"),
            BulkEditRejection::Unchanged => write!(f, "New value is the same as current value"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum BlockPropsError {
    #[error("Bulk edit rejected: {0}")]
    BulkEdit(BulkEditRejection),
    #[error("Invalid Command: {0}")]
    Command(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Service error: {0}")]
    Service(String),
}

impl From<BulkEditRejection> for BlockPropsError {
    fn from(src: BulkEditRejection) -> BlockPropsError {
        BlockPropsError::BulkEdit(src)
    }
}

impl From<StripPrefixError> for BlockPropsError {
    fn from(src: StripPrefixError) -> BlockPropsError {
        BlockPropsError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for BlockPropsError {
    fn from(src: toml::de::Error) -> BlockPropsError {
        BlockPropsError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for BlockPropsError {
    fn from(src: toml::ser::Error) -> BlockPropsError {
        BlockPropsError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for BlockPropsError {
    fn from(src: JsonError) -> BlockPropsError {
        BlockPropsError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for BlockPropsError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => BlockPropsError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => BlockPropsError::PermissionDenied,
            _ => BlockPropsError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for BlockPropsError {
    fn from(x: walkdir::Error) -> Self {
        match x.into_io_error() {
            Some(io_error) => io_error.into(),
            None => BlockPropsError::Io("directory walk hit a filesystem loop".to_string()),
        }
    }
}

impl From<fmt::Error> for BlockPropsError {
    fn from(x: fmt::Error) -> Self {
        BlockPropsError::Custom(format!("{x}"))
    }
}

impl From<RegexError> for BlockPropsError {
    fn from(x: RegexError) -> Self {
        BlockPropsError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<tokio::task::JoinError> for BlockPropsError {
    fn from(x: tokio::task::JoinError) -> Self {
        BlockPropsError::Service(format!("background task failed: {x}"))
    }
}

#[cfg(feature = "service")]
impl From<NotifyError> for BlockPropsError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => BlockPropsError::Custom(format!(
                "notify: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => BlockPropsError::Custom(format!(
                "notify: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => BlockPropsError::NotFound(format!(
                "notify: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => BlockPropsError::NotFound(format!(
                "notify: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                BlockPropsError::Custom("notify invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => {
                BlockPropsError::Custom("notify max file watch limit reached".to_string())
            }
        }
    }
}
