use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::types::RawRecord;
use crate::{parse_records, AlertSource};

/// Reads records from a JSON file that some other process keeps up to date.
///
/// Age filtering is left to the normalizer; the file is returned as-is.
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AlertSource for FileFeed {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch_alerts(&self, _max_age_days: u32) -> Result<Vec<RawRecord>> {
        let bytes = tokio::fs::read(&self.path).await?;
        let records = parse_records(&bytes)?;
        debug!(path = %self.path.display(), records = records.len(), "Read feed file");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeedError;

    #[tokio::test]
    async fn reads_records_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, r#"{"alerts": [{"region": "Los Ríos"}]}"#).unwrap();

        let records = FileFeed::new(&path).fetch_alerts(14).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileFeed::new(dir.path().join("nope.json"))
            .fetch_alerts(14)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Io(_)));
    }
}
