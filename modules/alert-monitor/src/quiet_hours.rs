//! Quiet-hours window and the notification policy derived from it.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// What the dispatcher may do this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPolicy {
    pub allow_sound: bool,
    pub allow_desktop: bool,
}

impl NotificationPolicy {
    pub fn silent() -> Self {
        Self {
            allow_sound: false,
            allow_desktop: false,
        }
    }
}

/// Local-time window during which sound is suppressed.
///
/// `start > end` wraps midnight (23:00–07:00). `start == end` is an empty window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub desktop_during_quiet_hours: bool,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN),
            desktop_during_quiet_hours: true,
        }
    }
}

impl QuietHours {
    pub fn is_quiet(&self, now: NaiveTime) -> bool {
        if !self.enabled || self.start == self.end {
            return false;
        }
        if self.start > self.end {
            self.start <= now || now < self.end
        } else {
            self.start <= now && now < self.end
        }
    }

    /// Combine the window with the user's sound/desktop toggles.
    pub fn decide(&self, now: NaiveTime, sound: bool, desktop: bool) -> NotificationPolicy {
        if self.is_quiet(now) {
            NotificationPolicy {
                allow_sound: false,
                allow_desktop: desktop && self.desktop_during_quiet_hours,
            }
        } else {
            NotificationPolicy {
                allow_sound: sound,
                allow_desktop: desktop,
            }
        }
    }
}
