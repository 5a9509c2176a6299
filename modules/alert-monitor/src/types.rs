use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// --- Alert ---

/// Alert severity as published by the feed. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    EarlyWarning,
    Yellow,
    Red,
}

impl AlertLevel {
    /// Parse a level from either the canonical names or the feed's Spanish
    /// vocabulary (`roja`, `amarilla`, `temprana`, `preventiva`).
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        let normalized = lowered
            .trim_start_matches("alerta ")
            .replace([' ', '-'], "_");
        match normalized.as_str() {
            "red" | "roja" | "rojo" => Some(Self::Red),
            "yellow" | "amarilla" | "amarillo" => Some(Self::Yellow),
            "early_warning" | "earlywarning" | "early" | "temprana" | "temprana_preventiva"
            | "preventiva" => Some(Self::EarlyWarning),
            _ => None,
        }
    }

    /// Upper-case label used in notification titles.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Yellow => "YELLOW",
            Self::EarlyWarning => "EARLY WARNING",
        }
    }

    pub fn all() -> &'static [AlertLevel] {
        &[Self::Red, Self::Yellow, Self::EarlyWarning]
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Yellow => write!(f, "yellow"),
            Self::EarlyWarning => write!(f, "early_warning"),
        }
    }
}

/// Derived from presence in the latest snapshot; never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Active,
    Cancelled,
}

/// One emergency notice in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub fingerprint: String,
    pub level: AlertLevel,
    pub region: String,
    pub affected_areas: Vec<String>,
    pub threat_type: String,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    /// Secondary attributes (resources, surface, link). Diffed, never part of identity.
    #[serde(default)]
    pub extra_fields: BTreeMap<String, String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(skip)]
    pub status: AlertStatus,
}

impl Alert {
    pub fn areas_text(&self) -> String {
        if self.affected_areas.is_empty() {
            "unspecified area".to_string()
        } else {
            self.affected_areas.join(", ")
        }
    }

    /// One-line description: `RED: Maule (Talca, Curicó) - wildfire`.
    pub fn headline(&self) -> String {
        format!(
            "{}: {} ({}) - {}",
            self.level.label(),
            self.region,
            self.areas_text(),
            self.threat_type
        )
    }
}

// --- Snapshot ---

/// Every alert seen in one fetch, keyed by fingerprint.
///
/// Serialized as a list sorted by fingerprint so state files diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Alert>", into = "Vec<Alert>")]
pub struct Snapshot {
    alerts: HashMap<String, Alert>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an alert. Returns false (and keeps the existing one) if the
    /// fingerprint is already present.
    pub fn insert(&mut self, alert: Alert) -> bool {
        if self.alerts.contains_key(&alert.fingerprint) {
            return false;
        }
        self.alerts.insert(alert.fingerprint.clone(), alert);
        true
    }

    pub fn get(&self, fingerprint: &str) -> Option<&Alert> {
        self.alerts.get(fingerprint)
    }

    pub fn get_mut(&mut self, fingerprint: &str) -> Option<&mut Alert> {
        self.alerts.get_mut(fingerprint)
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.alerts.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Alert> {
        self.alerts.values_mut()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Alert) -> bool) {
        self.alerts.retain(|_, alert| keep(alert));
    }

    /// Alerts ordered most severe first, then by region and fingerprint.
    pub fn sorted(&self) -> Vec<&Alert> {
        let mut alerts: Vec<&Alert> = self.alerts.values().collect();
        alerts.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then_with(|| a.region.cmp(&b.region))
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        alerts
    }

    pub fn count_level(&self, level: AlertLevel) -> usize {
        self.alerts.values().filter(|a| a.level == level).count()
    }
}

impl FromIterator<Alert> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Alert>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for alert in iter {
            snapshot.insert(alert);
        }
        snapshot
    }
}

impl From<Vec<Alert>> for Snapshot {
    fn from(alerts: Vec<Alert>) -> Self {
        alerts.into_iter().collect()
    }
}

impl From<Snapshot> for Vec<Alert> {
    fn from(snapshot: Snapshot) -> Self {
        let mut alerts: Vec<Alert> = snapshot.alerts.into_values().collect();
        alerts.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        alerts
    }
}

// --- Change events ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Updated,
    Cancelled,
    Unchanged,
}

impl ChangeKind {
    /// Whether this kind is worth telling anyone about.
    pub fn is_notable(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Position in event listings.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Updated => 1,
            Self::Cancelled => 2,
            Self::Unchanged => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Updated => "UPDATED",
            Self::Cancelled => "CANCELLED",
            Self::Unchanged => "UNCHANGED",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Updated => write!(f, "updated"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Old/new pair for one changed field. `None` means the field was absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Option<String>,
    pub new: Option<String>,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} → {}",
            self.old.as_deref().unwrap_or("∅"),
            self.new.as_deref().unwrap_or("∅")
        )
    }
}

/// Classification of one fingerprint between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub alert: Alert,
    /// Only populated for `Updated`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changes: BTreeMap<String, FieldChange>,
}

impl ChangeEvent {
    pub fn new_alert(alert: Alert) -> Self {
        Self {
            kind: ChangeKind::New,
            alert,
            changes: BTreeMap::new(),
        }
    }

    pub fn updated(alert: Alert, changes: BTreeMap<String, FieldChange>) -> Self {
        Self {
            kind: ChangeKind::Updated,
            alert,
            changes,
        }
    }

    pub fn cancelled(mut alert: Alert) -> Self {
        alert.status = AlertStatus::Cancelled;
        Self {
            kind: ChangeKind::Cancelled,
            alert,
            changes: BTreeMap::new(),
        }
    }

    pub fn unchanged(alert: Alert) -> Self {
        Self {
            kind: ChangeKind::Unchanged,
            alert,
            changes: BTreeMap::new(),
        }
    }

    /// Human-readable description used in logs, notifications and history.
    pub fn describe(&self) -> String {
        match self.kind {
            ChangeKind::Updated if !self.changes.is_empty() => {
                let fields: Vec<String> = self
                    .changes
                    .iter()
                    .map(|(field, change)| format!("{field}: {change}"))
                    .collect();
                format!("{} [{}]", self.alert.headline(), fields.join("; "))
            }
            _ => self.alert.headline(),
        }
    }
}

/// Compact history entry kept in persisted state and exported to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub fingerprint: String,
    pub kind: ChangeKind,
    pub at: DateTime<Utc>,
    pub level: AlertLevel,
    pub region: String,
    pub threat_type: String,
    pub description: String,
}

impl ChangeRecord {
    pub fn from_event(event: &ChangeEvent, at: DateTime<Utc>) -> Self {
        Self {
            fingerprint: event.alert.fingerprint.clone(),
            kind: event.kind,
            at,
            level: event.alert.level,
            region: event.alert.region.clone(),
            threat_type: event.alert.threat_type.clone(),
            description: event.describe(),
        }
    }
}

/// Notable events since local midnight; input to the daily summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayLog {
    pub date: Option<NaiveDate>,
    pub events: Vec<ChangeRecord>,
}

impl DayLog {
    /// Start a fresh log if `today` is a different day than the one recorded.
    pub fn roll_to(&mut self, today: NaiveDate) {
        if self.date != Some(today) {
            self.date = Some(today);
            self.events.clear();
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ChangeRecord>) {
        self.events.extend(records);
    }
}
