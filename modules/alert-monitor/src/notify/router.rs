use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::warn;

use super::backend::{DesktopNotice, NotifyBackend, SoundCue};
use super::slack::SlackWebhook;

/// Fans every notification out to all configured backends.
///
/// A failing backend does not stop the others; the call fails if any backend did.
pub struct NotifyRouter {
    backends: Vec<(&'static str, Box<dyn NotifyBackend>)>,
}

impl NotifyRouter {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    pub fn with(mut self, name: &'static str, backend: Box<dyn NotifyBackend>) -> Self {
        self.backends.push((name, backend));
        self
    }

    /// Add a Slack backend if `SLACK_WEBHOOK_URL` is set.
    pub fn with_slack_from_env(self, timeout: Duration) -> Self {
        match std::env::var("SLACK_WEBHOOK_URL") {
            Ok(url) if !url.trim().is_empty() => match SlackWebhook::new(url, timeout) {
                Ok(slack) => self.with("slack", Box::new(slack)),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "Slack notifications disabled");
                    self
                }
            },
            _ => self,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|(name, _)| *name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl Default for NotifyRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotifyBackend for NotifyRouter {
    async fn play_sound(&self, cue: &SoundCue) -> anyhow::Result<()> {
        let mut failed = Vec::new();
        for (name, backend) in &self.backends {
            if let Err(e) = backend.play_sound(cue).await {
                failed.push(format!("{name}: {e:#}"));
            }
        }
        combine(failed)
    }

    async fn show_desktop(&self, notice: &DesktopNotice) -> anyhow::Result<()> {
        let mut failed = Vec::new();
        for (name, backend) in &self.backends {
            if let Err(e) = backend.show_desktop(notice).await {
                failed.push(format!("{name}: {e:#}"));
            }
        }
        combine(failed)
    }
}

fn combine(failed: Vec<String>) -> anyhow::Result<()> {
    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(failed.join("; ")))
    }
}
