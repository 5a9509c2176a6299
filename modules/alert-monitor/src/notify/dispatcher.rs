use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::backend::{DesktopNotice, NotifyBackend, SoundCue};
use crate::quiet_hours::NotificationPolicy;
use crate::types::{AlertLevel, ChangeEvent, ChangeKind};

/// What the dispatcher did in one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    pub notable: usize,
    pub desktop_sent: usize,
    pub sounds_played: usize,
    pub failures: usize,
    pub suppressed_desktop: usize,
    pub suppressed_sounds: usize,
}

impl fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "notable={} desktop={} sounds={} failures={} suppressed(desktop={}, sound={})",
            self.notable,
            self.desktop_sent,
            self.sounds_played,
            self.failures,
            self.suppressed_desktop,
            self.suppressed_sounds
        )
    }
}

/// Turns filtered change events into notifications.
///
/// Never fails: backend errors are logged and counted.
pub struct Dispatcher {
    backend: Arc<dyn NotifyBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn NotifyBackend>) -> Self {
        Self { backend }
    }

    /// Send notifications for the notable events. Each backend call is bounded
    /// by `timeout`; a call that overruns counts as a failure.
    pub async fn dispatch(
        &self,
        events: &[ChangeEvent],
        policy: NotificationPolicy,
        timeout: Duration,
    ) -> DispatchStats {
        let notable: Vec<&ChangeEvent> = events.iter().filter(|e| e.kind.is_notable()).collect();
        let mut stats = DispatchStats {
            notable: notable.len(),
            ..Default::default()
        };
        if notable.is_empty() {
            return stats;
        }

        let cues = sound_cues(&notable);
        if policy.allow_sound {
            for cue in &cues {
                match bounded(timeout, self.backend.play_sound(cue)).await {
                    Ok(()) => stats.sounds_played += 1,
                    Err(e) => {
                        stats.failures += 1;
                        warn!(error = %format!("{e:#}"), kind = %cue.kind, "Sound notification failed");
                    }
                }
            }
        } else {
            stats.suppressed_sounds = cues.len();
        }

        if policy.allow_desktop {
            for event in &notable {
                let notice = notice_for(event);
                match bounded(timeout, self.backend.show_desktop(&notice)).await {
                    Ok(()) => stats.desktop_sent += 1,
                    Err(e) => {
                        stats.failures += 1;
                        warn!(
                            error = %format!("{e:#}"),
                            fingerprint = event.alert.fingerprint.as_str(),
                            "Desktop notification failed"
                        );
                    }
                }
            }
        } else {
            stats.suppressed_desktop = notable.len();
        }

        debug!(%stats, "Notifications dispatched");
        stats
    }
}

async fn bounded<F>(timeout: Duration, call: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("timed out after {}s", timeout.as_secs_f32()),
    }
}

/// One cue per kind present, at the highest level seen for that kind.
pub fn sound_cues(events: &[&ChangeEvent]) -> Vec<SoundCue> {
    let mut highest: BTreeMap<u8, (ChangeKind, AlertLevel)> = BTreeMap::new();
    for event in events.iter().filter(|e| e.kind.is_notable()) {
        highest
            .entry(event.kind.rank())
            .and_modify(|(_, level)| *level = (*level).max(event.alert.level))
            .or_insert((event.kind, event.alert.level));
    }
    highest
        .into_values()
        .map(|(kind, level)| SoundCue { kind, level })
        .collect()
}

/// Build the on-screen message for one event.
pub fn notice_for(event: &ChangeEvent) -> DesktopNotice {
    let alert = &event.alert;
    let title = format!("{} {} ALERT", event.kind.label(), alert.level.label());

    let place = format!("{} ({})", alert.region, alert.areas_text());
    let body = match event.kind {
        ChangeKind::Updated => {
            let changes: Vec<String> = event
                .changes
                .iter()
                .map(|(field, change)| format!("{field}: {change}"))
                .collect();
            format!("{place}\n{}\n{}", alert.threat_type, changes.join("\n"))
        }
        ChangeKind::Cancelled => {
            format!("{place}\n{} (no longer published)", alert.threat_type)
        }
        _ => format!("{place}\n{}", alert.threat_type),
    };

    DesktopNotice {
        title,
        body,
        kind: event.kind,
        level: alert.level,
        urgent: event.kind == ChangeKind::New && alert.level == AlertLevel::Red,
    }
}
