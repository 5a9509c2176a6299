use async_trait::async_trait;

use crate::types::{AlertLevel, ChangeKind};

/// One audible cue. Bursts of events of the same kind share a single cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundCue {
    pub kind: ChangeKind,
    pub level: AlertLevel,
}

/// One on-screen notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopNotice {
    pub title: String,
    pub body: String,
    pub kind: ChangeKind,
    pub level: AlertLevel,
    pub urgent: bool,
}

/// Pluggable notification backend for the monitor.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Play an audible cue.
    async fn play_sound(&self, cue: &SoundCue) -> anyhow::Result<()>;

    /// Show a desktop notification.
    async fn show_desktop(&self, notice: &DesktopNotice) -> anyhow::Result<()>;
}
