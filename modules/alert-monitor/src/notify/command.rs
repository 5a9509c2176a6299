use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::backend::{DesktopNotice, NotifyBackend, SoundCue};
use crate::types::ChangeKind;

/// Longest body handed to the desktop notifier.
const MAX_BODY_CHARS: usize = 200;

/// Runs local commands for desktop and sound notifications.
///
/// Arguments may contain `{title}`, `{body}`, `{urgency}`, `{expire_ms}`, `{kind}`
/// and `{level}` placeholders. With no sound command configured the terminal bell
/// is rung instead: three times for new alerts, once otherwise.
pub struct CommandBackend {
    desktop_command: Vec<String>,
    sound_command: Vec<String>,
    timeout: Duration,
}

impl CommandBackend {
    pub fn new(desktop_command: Vec<String>, sound_command: Vec<String>, timeout: Duration) -> Self {
        Self {
            desktop_command,
            sound_command,
            timeout,
        }
    }

    async fn run(&self, argv: &[String]) -> anyhow::Result<()> {
        let (program, args) = argv
            .split_first()
            .context("notification command is empty")?;

        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .with_context(|| format!("{program} timed out after {:?}", self.timeout))?
            .with_context(|| format!("failed to run {program}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{program} exited with {}: {}", output.status, stderr.trim());
        }
        Ok(())
    }

    async fn ring_bell(&self, kind: ChangeKind) -> anyhow::Result<()> {
        let rings = if kind == ChangeKind::New { 3 } else { 1 };
        for i in 0..rings {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            let mut err = std::io::stderr();
            err.write_all(b"\x07")?;
            err.flush()?;
        }
        Ok(())
    }
}

fn substitute(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        })
        .collect()
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl NotifyBackend for CommandBackend {
    async fn play_sound(&self, cue: &SoundCue) -> anyhow::Result<()> {
        if self.sound_command.is_empty() {
            return self.ring_bell(cue.kind).await;
        }
        let kind = cue.kind.to_string();
        let level = cue.level.to_string();
        let argv = substitute(
            &self.sound_command,
            &[("kind", kind.as_str()), ("level", level.as_str())],
        );
        debug!(command = ?argv, "Playing sound");
        self.run(&argv).await
    }

    async fn show_desktop(&self, notice: &DesktopNotice) -> anyhow::Result<()> {
        if self.desktop_command.is_empty() {
            return Ok(());
        }
        let body = truncate(&notice.body, MAX_BODY_CHARS);
        let kind = notice.kind.to_string();
        let level = notice.level.to_string();
        let (urgency, expire_ms) = if notice.urgent {
            ("critical", "20000")
        } else {
            ("normal", "10000")
        };
        let argv = substitute(
            &self.desktop_command,
            &[
                ("title", notice.title.as_str()),
                ("body", body.as_str()),
                ("urgency", urgency),
                ("expire_ms", expire_ms),
                ("kind", kind.as_str()),
                ("level", level.as_str()),
            ],
        );
        debug!(command = ?argv, "Showing desktop notification");
        self.run(&argv).await
    }
}
