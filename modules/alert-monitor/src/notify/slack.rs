use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::backend::{DesktopNotice, NotifyBackend, SoundCue};
use crate::types::{AlertLevel, ChangeKind};

/// Slack incoming webhook notification backend.
///
/// Mirrors desktop notifications into a channel. Sound cues are ignored.
pub struct SlackWebhook {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackWebhook {
    pub fn new(webhook_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Slack HTTP client")?;
        Ok(Self { webhook_url, http })
    }

    fn level_emoji(level: AlertLevel) -> &'static str {
        match level {
            AlertLevel::Red => ":red_circle:",
            AlertLevel::Yellow => ":large_yellow_circle:",
            AlertLevel::EarlyWarning => ":large_green_circle:",
        }
    }

    fn format(notice: &DesktopNotice) -> String {
        let marker = match notice.kind {
            ChangeKind::Cancelled => ":white_check_mark:",
            _ => Self::level_emoji(notice.level),
        };
        let mut text = format!("{marker} *{}*\n{}", notice.title, notice.body);
        if notice.urgent {
            text.push_str("\n<!channel>");
        }
        text
    }

    async fn post(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Slack webhook returned non-success");
            anyhow::bail!("Slack webhook returned {status}");
        }

        Ok(())
    }
}

#[async_trait]
impl NotifyBackend for SlackWebhook {
    async fn play_sound(&self, _cue: &SoundCue) -> anyhow::Result<()> {
        Ok(())
    }

    async fn show_desktop(&self, notice: &DesktopNotice) -> anyhow::Result<()> {
        let payload = json!({
            "text": Self::format(notice),
            "unfurl_links": false,
        });

        self.post(payload).await
    }
}
