//! The monitor loop: fetch → normalize → diff → filter → notify → persist →
//! summarize → export, then sleep until the next cycle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alert_feed::{AlertSource, RawRecord};
use chrono::NaiveDate;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigLoader, ResolvedConfig};
use crate::diff::{carry_forward, diff_snapshots};
use crate::error::MonitorError;
use crate::export::{DashboardData, DashboardExporter};
use crate::normalize::{expire_undated, normalize_batch};
use crate::notify::{DispatchStats, Dispatcher, NotifyBackend};
use crate::state::{PersistedState, StateStore};
use crate::summary::{is_due, DailySummary, MarkdownSummaryWriter, SummaryRenderer};
use crate::types::{Alert, ChangeEvent, ChangeKind, ChangeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Idle,
    Fetching,
    Processing,
    Notifying,
    Persisting,
    Summarizing,
    Exporting,
    Sleeping,
    Stopped,
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching => write!(f, "fetching"),
            Self::Processing => write!(f, "processing"),
            Self::Notifying => write!(f, "notifying"),
            Self::Persisting => write!(f, "persisting"),
            Self::Summarizing => write!(f, "summarizing"),
            Self::Exporting => write!(f, "exporting"),
            Self::Sleeping => write!(f, "sleeping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Stats from one completed cycle.
#[derive(Debug, Default, Clone)]
pub struct CycleStats {
    pub run_id: Uuid,
    pub fetched: usize,
    pub active: usize,
    pub malformed: usize,
    pub stale: usize,
    pub duplicates: usize,
    pub new: usize,
    pub updated: usize,
    pub cancelled: usize,
    pub unchanged: usize,
    pub filtered_out: usize,
    pub notify: DispatchStats,
    pub summary_written: bool,
    pub exported: bool,
}

impl CycleStats {
    pub fn has_changes(&self) -> bool {
        self.new + self.updated + self.cancelled > 0
    }

    fn count(&mut self, events: &[ChangeEvent]) {
        for event in events {
            match event.kind {
                ChangeKind::New => self.new += 1,
                ChangeKind::Updated => self.updated += 1,
                ChangeKind::Cancelled => self.cancelled += 1,
                ChangeKind::Unchanged => self.unchanged += 1,
            }
        }
    }
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} active={} new={} updated={} cancelled={} unchanged={} \
             malformed={} stale={} duplicates={} filtered_out={} {}",
            self.fetched,
            self.active,
            self.new,
            self.updated,
            self.cancelled,
            self.unchanged,
            self.malformed,
            self.stale,
            self.duplicates,
            self.filtered_out,
            self.notify,
        )
    }
}

/// Delay before retrying after `failures` consecutive fetch failures:
/// `min(base · 2^(failures-1), max)`.
pub fn backoff_delay(failures: u32, base: Duration, max: Duration) -> Duration {
    let exponent = failures.saturating_sub(1);
    let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Orchestrates monitor cycles. Owns no alert state between cycles: everything
/// is loaded from and saved to the [`StateStore`].
pub struct Monitor {
    source: Box<dyn AlertSource>,
    config: ConfigLoader,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    summary_renderer: Option<Arc<dyn SummaryRenderer>>,
    phase: MonitorPhase,
    consecutive_failures: u32,
    shutdown: Option<watch::Receiver<bool>>,
    /// Summary date rendered but not yet persisted.
    unsaved_summary_date: Option<NaiveDate>,
}

impl Monitor {
    pub fn new(
        source: Box<dyn AlertSource>,
        config: ConfigLoader,
        notifier: Arc<dyn NotifyBackend>,
    ) -> Self {
        Self {
            source,
            config,
            dispatcher: Dispatcher::new(notifier),
            clock: Arc::new(SystemClock),
            summary_renderer: None,
            phase: MonitorPhase::Idle,
            consecutive_failures: 0,
            shutdown: None,
            unsaved_summary_date: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the default Markdown writer (which follows `summary.dir`).
    pub fn with_summary_renderer(mut self, renderer: Arc<dyn SummaryRenderer>) -> Self {
        self.summary_renderer = Some(renderer);
        self
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn config(&self) -> &ResolvedConfig {
        self.config.current()
    }

    fn store(&self) -> StateStore {
        StateStore::new(&self.config.current().raw.paths.state_file)
    }

    fn enter(&mut self, phase: MonitorPhase) {
        debug!(from = %self.phase, to = %phase, "Phase");
        self.phase = phase;
    }

    /// Run a single cycle and stop.
    pub async fn run_once(&mut self) -> Result<CycleStats, MonitorError> {
        let result = self.run_cycle().await;
        match &result {
            Ok(_) => self.consecutive_failures = 0,
            Err(e) if e.is_fetch_failure() => self.consecutive_failures += 1,
            Err(_) => {}
        }
        self.enter(MonitorPhase::Stopped);
        result
    }

    /// Run cycles until `shutdown` flips to true.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<(), MonitorError> {
        let mut stop = shutdown.clone();
        self.shutdown = Some(shutdown);

        info!(
            interval_secs = self.config.current().raw.interval_secs,
            max_alert_age_days = self.config.current().raw.max_alert_age_days,
            source = self.source.name(),
            "Monitor starting"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            let delay = match self.run_cycle().await {
                Ok(_) => {
                    self.consecutive_failures = 0;
                    self.config.current().interval()
                }
                Err(MonitorError::Stopped) => break,
                Err(e) if e.is_fetch_failure() => {
                    self.consecutive_failures += 1;
                    let settings = &self.config.current().raw.fetch;
                    let delay = backoff_delay(
                        self.consecutive_failures,
                        Duration::from_secs(settings.backoff_base_secs),
                        Duration::from_secs(settings.backoff_max_secs),
                    );
                    warn!(
                        error = %e,
                        failures = self.consecutive_failures,
                        retry_in_secs = delay.as_secs(),
                        "Fetch failed, backing off"
                    );
                    delay
                }
                Err(e) => {
                    error!(error = %e, "Cycle failed");
                    self.config.current().interval()
                }
            };

            self.enter(MonitorPhase::Sleeping);
            debug!(secs = delay.as_secs(), "Sleeping");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut stop) => break,
            }
        }

        self.enter(MonitorPhase::Stopped);
        info!("Monitor stopped");
        Ok(())
    }

    /// One fetch-to-export pass. The state file is only written once the
    /// fetch and diff have succeeded.
    pub async fn run_cycle(&mut self) -> Result<CycleStats, MonitorError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("cycle", %run_id);
        self.cycle_inner(run_id).instrument(span).await
    }

    async fn cycle_inner(&mut self, run_id: Uuid) -> Result<CycleStats, MonitorError> {
        let config = self.config.reload().clone();
        let mut stats = CycleStats {
            run_id,
            ..Default::default()
        };

        // --- Fetch ---
        self.enter(MonitorPhase::Fetching);
        let records = fetch(
            self.source.as_ref(),
            self.shutdown.as_mut(),
            config.raw.fetch.timeout(),
            config.raw.max_alert_age_days,
        )
        .await?;
        stats.fetched = records.len();

        // --- Normalize, diff, filter ---
        self.enter(MonitorPhase::Processing);
        let now = self.clock.now_utc();
        let batch = normalize_batch(&records, now, config.raw.max_alert_age_days);
        stats.malformed = batch.malformed;
        stats.stale = batch.stale;
        stats.duplicates = batch.duplicates;

        let store = self.store();
        let mut state = store.load();
        if let Some(date) = self.unsaved_summary_date {
            if state.last_summary_date.map_or(true, |last| last < date) {
                state.last_summary_date = Some(date);
            }
        }
        let mut snapshot = batch.snapshot;
        carry_forward(&state.snapshot, &mut snapshot, now);
        stats.stale += expire_undated(&mut snapshot, now, config.raw.max_alert_age_days);

        let events = diff_snapshots(&state.snapshot, &snapshot);
        stats.count(&events);
        stats.active = snapshot.len();

        let filtered = config.filter.apply(&events);
        stats.filtered_out = events.len() - filtered.len();

        for event in filtered.iter().filter(|e| e.kind.is_notable()) {
            info!(
                kind = %event.kind,
                level = %event.alert.level,
                fingerprint = event.alert.fingerprint.as_str(),
                "{}",
                event.describe()
            );
        }

        // --- Notify ---
        self.enter(MonitorPhase::Notifying);
        let policy = config.quiet_hours.decide(
            self.clock.time_of_day(),
            config.raw.notifications.sound,
            config.raw.notifications.desktop,
        );
        let dispatch = self
            .dispatcher
            .dispatch(&filtered, policy, config.notify_timeout());
        stats.notify = match self.shutdown.as_mut() {
            Some(rx) => tokio::select! {
                notify = dispatch => notify,
                _ = shutdown_requested(rx) => {
                    info!("Shutdown requested during notification, persisting");
                    DispatchStats::default()
                }
            },
            None => dispatch.await,
        };

        // --- Persist ---
        self.enter(MonitorPhase::Persisting);
        let today = self.clock.today();
        state.day_log.roll_to(today);
        state.day_log.extend(
            filtered
                .iter()
                .filter(|e| e.kind.is_notable())
                .map(|e| ChangeRecord::from_event(e, now)),
        );
        state.record_changes(
            events
                .iter()
                .filter(|e| e.kind.is_notable())
                .map(|e| ChangeRecord::from_event(e, now)),
        );
        state.snapshot = snapshot;
        state.last_run_at = Some(now);
        store.save(&state)?;
        self.unsaved_summary_date = None;

        // --- Summary ---
        if config.raw.summary.enabled
            && is_due(self.clock.now(), config.summary_time, state.last_summary_date)
        {
            self.enter(MonitorPhase::Summarizing);
            stats.summary_written = self.write_summary(&config, &store, &mut state).await;
        }

        // --- Export ---
        if let Some(path) = &config.raw.paths.dashboard_file {
            self.enter(MonitorPhase::Exporting);
            let data = DashboardData::build(
                &state.snapshot,
                &state.recent_changes,
                &events,
                &config.raw.known_regions,
                now,
            );
            match DashboardExporter::new(path).write(&data) {
                Ok(()) => stats.exported = true,
                Err(e) => warn!(error = %format!("{e:#}"), "Dashboard export failed"),
            }
        }

        info!(%stats, "Cycle complete");
        Ok(stats)
    }

    /// Build, render and record today's summary. Returns true if it was written.
    async fn write_summary(
        &mut self,
        config: &ResolvedConfig,
        store: &StateStore,
        state: &mut PersistedState,
    ) -> bool {
        let today = self.clock.today();
        let summary = DailySummary::build(
            today,
            &state.day_log,
            active_alerts(config, state),
            self.clock.now_utc(),
        );

        let renderer = self.renderer(config);
        if let Err(e) = renderer.render(&summary).await {
            warn!(error = %format!("{e:#}"), "Daily summary failed, will retry next cycle");
            return false;
        }

        state.last_summary_date = Some(today);
        if let Err(e) = store.save(state) {
            warn!(error = %e, "Failed to record summary date, will save it next cycle");
            self.unsaved_summary_date = Some(today);
        }
        true
    }

    fn renderer(&self, config: &ResolvedConfig) -> Arc<dyn SummaryRenderer> {
        match &self.summary_renderer {
            Some(renderer) => renderer.clone(),
            None => Arc::new(MarkdownSummaryWriter::new(&config.raw.summary.dir)),
        }
    }

    /// Generate today's summary from persisted state without fetching, and mark
    /// the day as summarised.
    pub async fn summarize_now(&mut self) -> anyhow::Result<DailySummary> {
        let config = self.config.reload().clone();
        let store = self.store();
        let mut state = store.load();
        state.day_log.roll_to(self.clock.today());

        self.enter(MonitorPhase::Summarizing);
        let summary = DailySummary::build(
            self.clock.today(),
            &state.day_log,
            active_alerts(&config, &state),
            self.clock.now_utc(),
        );
        self.renderer(&config).render(&summary).await?;

        state.last_summary_date = Some(summary.date);
        store.save(&state)?;
        self.enter(MonitorPhase::Stopped);
        Ok(summary)
    }

    /// Active alerts from persisted state that pass the configured filter,
    /// most severe first.
    pub fn active_alerts(&self) -> Vec<Alert> {
        active_alerts(self.config.current(), &self.store().load())
    }
}

fn active_alerts(config: &ResolvedConfig, state: &PersistedState) -> Vec<Alert> {
    state
        .snapshot
        .sorted()
        .into_iter()
        .filter(|a| config.filter.passes_alert(a))
        .cloned()
        .collect()
}

/// Fetch with a timeout, giving up early if shutdown is requested.
async fn fetch(
    source: &dyn AlertSource,
    shutdown: Option<&mut watch::Receiver<bool>>,
    timeout: Duration,
    max_age_days: u32,
) -> Result<Vec<RawRecord>, MonitorError> {
    let bounded = tokio::time::timeout(timeout, source.fetch_alerts(max_age_days));

    let outcome = match shutdown {
        Some(rx) => tokio::select! {
            outcome = bounded => outcome,
            _ = shutdown_requested(rx) => {
                info!("Shutdown requested during fetch");
                return Err(MonitorError::Stopped);
            }
        },
        None => bounded.await,
    };

    match outcome {
        Ok(Ok(records)) => {
            debug!(source = source.name(), records = records.len(), "Fetched");
            Ok(records)
        }
        Ok(Err(e)) => Err(MonitorError::Fetch(e)),
        Err(_) => Err(MonitorError::FetchTimeout {
            secs: timeout.as_secs(),
        }),
    }
}

/// Resolves once the flag is true. Never resolves if the sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
