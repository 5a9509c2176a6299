use async_trait::async_trait;

use super::backend::{DesktopNotice, NotifyBackend, SoundCue};

/// No-op notification backend for testing.
pub struct NoopBackend;

#[async_trait]
impl NotifyBackend for NoopBackend {
    async fn play_sound(&self, _cue: &SoundCue) -> anyhow::Result<()> {
        Ok(())
    }

    async fn show_desktop(&self, _notice: &DesktopNotice) -> anyhow::Result<()> {
        Ok(())
    }
}
