//! Once-a-day digest of the day's changes.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::state::write_atomic;
use crate::types::{Alert, AlertLevel, ChangeKind, ChangeRecord, DayLog};

/// True once the scheduled time has passed and today has not been summarised yet.
pub fn is_due(
    now: DateTime<FixedOffset>,
    scheduled: NaiveTime,
    last_summary_date: Option<NaiveDate>,
) -> bool {
    now.time() >= scheduled && last_summary_date != Some(now.date_naive())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub new: usize,
    pub updated: usize,
    pub cancelled: usize,
}

impl KindCounts {
    pub fn total(&self) -> usize {
        self.new + self.updated + self.cancelled
    }
}

/// Aggregated view of one local day.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub by_kind: KindCounts,
    pub by_level: BTreeMap<AlertLevel, usize>,
    pub by_region: BTreeMap<String, usize>,
    pub changes: Vec<ChangeRecord>,
    /// Alerts active at generation time, most severe first.
    pub active: Vec<Alert>,
}

impl DailySummary {
    pub fn build(
        date: NaiveDate,
        day_log: &DayLog,
        active: Vec<Alert>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut by_kind = KindCounts::default();
        let mut by_level = BTreeMap::new();
        let mut by_region = BTreeMap::new();

        // A log from another day contributes nothing.
        let changes: Vec<ChangeRecord> = if day_log.date == Some(date) {
            day_log.events.clone()
        } else {
            Vec::new()
        };

        for record in &changes {
            match record.kind {
                ChangeKind::New => by_kind.new += 1,
                ChangeKind::Updated => by_kind.updated += 1,
                ChangeKind::Cancelled => by_kind.cancelled += 1,
                ChangeKind::Unchanged => continue,
            }
            *by_level.entry(record.level).or_insert(0) += 1;
            *by_region.entry(record.region.clone()).or_insert(0) += 1;
        }

        Self {
            date,
            generated_at,
            by_kind,
            by_level,
            by_region,
            changes,
            active,
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Alert summary for {}", self.date.format("%Y-%m-%d"));
        let _ = writeln!(
            out,
            "\n_Generated {}_\n",
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        );

        let _ = writeln!(out, "## Changes\n");
        let _ = writeln!(out, "| New | Updated | Cancelled | Total |");
        let _ = writeln!(out, "|---|---|---|---|");
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            self.by_kind.new,
            self.by_kind.updated,
            self.by_kind.cancelled,
            self.by_kind.total()
        );

        if !self.by_level.is_empty() {
            let _ = writeln!(out, "\n### By level\n");
            for level in AlertLevel::all() {
                if let Some(count) = self.by_level.get(level) {
                    let _ = writeln!(out, "- {}: {count}", level.label());
                }
            }
        }

        if !self.by_region.is_empty() {
            let _ = writeln!(out, "\n### By region\n");
            for (region, count) in &self.by_region {
                let _ = writeln!(out, "- {region}: {count}");
            }
        }

        let _ = writeln!(out, "\n## Timeline\n");
        if self.changes.is_empty() {
            let _ = writeln!(out, "No changes recorded today.");
        }
        for record in &self.changes {
            let _ = writeln!(
                out,
                "- {} **{}** {}",
                record.at.format("%H:%M"),
                record.kind.label(),
                record.description
            );
        }

        let _ = writeln!(out, "\n## Active alerts ({})\n", self.active.len());
        if self.active.is_empty() {
            let _ = writeln!(out, "No active alerts.");
        }
        for alert in &self.active {
            let _ = writeln!(out, "- {}", alert.headline());
        }

        out
    }
}

/// Where summaries go once built.
#[async_trait]
pub trait SummaryRenderer: Send + Sync {
    async fn render(&self, summary: &DailySummary) -> anyhow::Result<()>;
}

/// Writes `summary-YYYY-MM-DD.md` into a directory.
pub struct MarkdownSummaryWriter {
    dir: PathBuf,
}

impl MarkdownSummaryWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("summary-{}.md", date.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl SummaryRenderer for MarkdownSummaryWriter {
    async fn render(&self, summary: &DailySummary) -> anyhow::Result<()> {
        let path = self.path_for(summary.date);
        write_atomic(&path, summary.to_markdown().as_bytes())
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
        info!(
            path = %path.display(),
            changes = summary.by_kind.total(),
            active = summary.active.len(),
            "Daily summary written"
        );
        Ok(())
    }
}
