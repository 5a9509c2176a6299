//! Sources of raw alert records.
//!
//! The monitor never scrapes pages itself. It asks an [`AlertSource`] for the
//! records the extraction side produced: over HTTP, from an extractor process
//! (the headless-browser scraper), or from a JSON file on disk.

pub mod error;
pub mod file;
pub mod http;
pub mod process;
pub mod types;

pub use error::{FeedError, Result};
pub use file::FileFeed;
pub use http::HttpFeed;
pub use process::CommandFeed;
pub use types::RawRecord;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

/// Anything that can produce the current batch of raw alert records.
#[async_trait]
pub trait AlertSource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Fetch every alert published within the last `max_age_days` days.
    async fn fetch_alerts(&self, max_age_days: u32) -> Result<Vec<RawRecord>>;
}

/// Parse a feed payload into records.
///
/// Accepts either a bare JSON array or an object wrapping the array under
/// `alerts` (or the feed's own `alertas`). Elements that are not objects
/// cannot be records and are dropped with a warning.
pub fn parse_records(payload: &[u8]) -> Result<Vec<RawRecord>> {
    let value: Value = serde_json::from_slice(payload)?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("alerts").or_else(|| map.remove("alertas")) {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(FeedError::Parse("`alerts` is not an array".into())),
            None => return Err(FeedError::Parse("payload has no `alerts` array".into())),
        },
        other => {
            return Err(FeedError::Parse(format!(
                "expected array or object, got {}",
                type_name(&other)
            )))
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => records.push(RawRecord::from(map)),
            other => warn!(index, kind = type_name(&other), "Skipping non-object feed entry"),
        }
    }
    Ok(records)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
