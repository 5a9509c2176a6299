use std::path::PathBuf;

use thiserror::Error;

/// Why a single raw record could not become an [`Alert`](crate::types::Alert).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Older than the configured maximum age. Not an error in the feed, just out of range.
    #[error("record is {age_days} days old (max {max_days})")]
    Stale { age_days: i64, max_days: u32 },
}

/// Errors from the state store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to save state to {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors that end a monitor cycle early.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] alert_feed::FeedError),

    #[error("fetch timed out after {secs}s")]
    FetchTimeout { secs: u64 },

    #[error("state save failed: {0}")]
    StateSave(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("monitor stopped")]
    Stopped,
}

impl MonitorError {
    /// Fetch failures are transient and trigger backoff; the rest do not.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::FetchTimeout { .. })
    }
}
