//! Error taxonomy for ingestion and sync

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Input could not be classified as any known source
    #[error("cannot detect source for {path}: {reason}")]
    Detection { path: String, reason: String },

    /// No credential profile produced a usable session
    #[error("no usable credentials for {source_name}: {}", .failures.join(" | "))]
    Credential {
        source_name: String,
        failures: Vec<String>,
    },

    /// Transport failure that survived all retries
    #[error("request to {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    /// Some listed items were not fetched; the watermark stays put
    #[error("{failed} item(s) from {source_name} could not be fetched; will retry next cycle")]
    Incomplete { source_name: String, failed: usize },

    /// A single malformed record
    #[error("malformed record in {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error("another writer is active on {path}; try again after it finishes")]
    StorageLock { path: String },

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl SyncError {
    pub fn detection(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        SyncError::Detection {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn fetch(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        SyncError::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(context: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        SyncError::Parse {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that must abort the whole cycle rather than one job
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::StorageLock { .. })
    }
}
