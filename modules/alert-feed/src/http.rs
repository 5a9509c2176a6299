use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::{FeedError, Result};
use crate::types::RawRecord;
use crate::{parse_records, AlertSource};

/// JSON alert feed served over HTTP.
///
/// Issues `GET {url}?max_age_days=N`, optionally with a bearer token, and
/// expects the payload shapes understood by [`parse_records`].
pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpFeed {
    pub fn new(url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }
}

#[async_trait]
impl AlertSource for HttpFeed {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_alerts(&self, max_age_days: u32) -> Result<Vec<RawRecord>> {
        let mut request = self
            .client
            .get(&self.url)
            .query(&[("max_age_days", max_age_days)])
            .header("Accept", "application/json");
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FeedError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.bytes().await?;
        let records = parse_records(&body)?;
        info!(url = self.url.as_str(), records = records.len(), "Fetched feed");
        Ok(records)
    }
}
