//! Dashboard data file.
//!
//! A static page reads this after every successful cycle. The schema is stable:
//! `alerts`, `changes`, `last_cycle_events`, `stats`, `region_status`, `by_threat`
//! and `regions`. A `.js` target is wrapped as `const D=<json>;`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::normalize::fold;
use crate::state::write_atomic;
use crate::types::{Alert, AlertLevel, ChangeEvent, ChangeRecord, Snapshot};

/// Number of history entries included in the export.
pub const MAX_EXPORTED_CHANGES: usize = 50;

/// Regions shown on the dashboard even when they have no alerts.
pub const DEFAULT_REGIONS: &[&str] = &[
    "Arica y Parinacota",
    "Tarapacá",
    "Antofagasta",
    "Atacama",
    "Coquimbo",
    "Valparaíso",
    "Metropolitana",
    "O'Higgins",
    "Maule",
    "Ñuble",
    "Biobío",
    "La Araucanía",
    "Los Ríos",
    "Los Lagos",
    "Aysén",
    "Magallanes",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    pub total: usize,
    pub red: usize,
    pub yellow: usize,
    pub early_warning: usize,
}

impl LevelCounts {
    fn add(&mut self, level: AlertLevel) {
        self.total += 1;
        match level {
            AlertLevel::Red => self.red += 1,
            AlertLevel::Yellow => self.yellow += 1,
            AlertLevel::EarlyWarning => self.early_warning += 1,
        }
    }

    /// Most severe level present, or `none`.
    fn status(&self) -> &'static str {
        if self.red > 0 {
            "red"
        } else if self.yellow > 0 {
            "yellow"
        } else if self.early_warning > 0 {
            "early_warning"
        } else {
            "none"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionStatus {
    pub status: &'static str,
    pub red: usize,
    pub yellow: usize,
    pub early_warning: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub generated_at: DateTime<Utc>,
    pub alerts: Vec<Alert>,
    pub changes: Vec<ChangeRecord>,
    pub last_cycle_events: Vec<ChangeRecord>,
    pub stats: LevelCounts,
    pub region_status: BTreeMap<String, RegionStatus>,
    pub by_threat: BTreeMap<String, usize>,
    pub regions: Vec<String>,
}

impl DashboardData {
    /// Build the export from the unfiltered snapshot and the change history.
    pub fn build(
        snapshot: &Snapshot,
        recent_changes: &[ChangeRecord],
        last_cycle: &[ChangeEvent],
        known_regions: &[String],
        generated_at: DateTime<Utc>,
    ) -> Self {
        let alerts: Vec<Alert> = snapshot.sorted().into_iter().cloned().collect();

        let mut stats = LevelCounts::default();
        let mut by_threat: BTreeMap<String, usize> = BTreeMap::new();
        let mut per_region: BTreeMap<String, LevelCounts> = known_regions
            .iter()
            .map(|r| (r.clone(), LevelCounts::default()))
            .collect();

        for alert in &alerts {
            stats.add(alert.level);
            *by_threat.entry(alert.threat_type.clone()).or_insert(0) += 1;

            let folded = fold(&alert.region);
            let key = known_regions
                .iter()
                .find(|known| fold(known) == folded)
                .cloned()
                .unwrap_or_else(|| alert.region.clone());
            per_region.entry(key).or_default().add(alert.level);
        }

        let region_status = per_region
            .into_iter()
            .map(|(region, counts)| {
                let status = RegionStatus {
                    status: counts.status(),
                    red: counts.red,
                    yellow: counts.yellow,
                    early_warning: counts.early_warning,
                };
                (region, status)
            })
            .collect();

        let skip = recent_changes.len().saturating_sub(MAX_EXPORTED_CHANGES);
        let changes = recent_changes[skip..].to_vec();

        let last_cycle_events = last_cycle
            .iter()
            .filter(|e| e.kind.is_notable())
            .map(|e| ChangeRecord::from_event(e, generated_at))
            .collect();

        Self {
            generated_at,
            alerts,
            changes,
            last_cycle_events,
            stats,
            region_status,
            by_threat,
            regions: known_regions.to_vec(),
        }
    }
}

/// Writes [`DashboardData`] to a file, atomically.
pub struct DashboardExporter {
    path: PathBuf,
}

impl DashboardExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, data: &DashboardData) -> anyhow::Result<()> {
        let json = serde_json::to_string(data).context("failed to encode dashboard data")?;
        let is_js = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("js"));
        let contents = if is_js {
            format!("const D={json};")
        } else {
            json
        };

        write_atomic(&self.path, contents.as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(
            path = %self.path.display(),
            alerts = data.alerts.len(),
            "Dashboard data exported"
        );
        Ok(())
    }
}
