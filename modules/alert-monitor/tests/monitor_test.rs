//! End-to-end cycles against an in-memory feed, a recording notifier and a
//! manual clock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alert_feed::{AlertSource, FeedError, RawRecord};
use alert_monitor::clock::ManualClock;
use alert_monitor::config::FetchConfig;
use alert_monitor::notify::{DesktopNotice, NotifyBackend, SoundCue};
use alert_monitor::state::StateStore;
use alert_monitor::summary::{DailySummary, SummaryRenderer};
use alert_monitor::{
    ChangeKind, ConfigLoader, Monitor, MonitorConfig, MonitorError, MonitorPhase, ResolvedConfig,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

enum Response {
    Records(Vec<RawRecord>),
    Fail(String),
    Hang,
}

#[derive(Clone)]
struct MemoryFeed {
    response: Arc<Mutex<Response>>,
}

impl MemoryFeed {
    fn new() -> Self {
        Self {
            response: Arc::new(Mutex::new(Response::Records(Vec::new()))),
        }
    }

    fn set(&self, records: Vec<RawRecord>) {
        *self.response.lock().unwrap() = Response::Records(records);
    }

    fn fail(&self, message: &str) {
        *self.response.lock().unwrap() = Response::Fail(message.to_string());
    }

    fn hang(&self) {
        *self.response.lock().unwrap() = Response::Hang;
    }
}

#[async_trait]
impl AlertSource for MemoryFeed {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_alerts(&self, _max_age_days: u32) -> alert_feed::Result<Vec<RawRecord>> {
        let outcome = match &*self.response.lock().unwrap() {
            Response::Records(records) => Some(Ok(records.clone())),
            Response::Fail(message) => Some(Err(FeedError::Network(message.clone()))),
            Response::Hang => None,
        };
        match outcome {
            Some(result) => result,
            None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sounds: Mutex<Vec<SoundCue>>,
    notices: Mutex<Vec<DesktopNotice>>,
}

impl RecordingNotifier {
    fn titles(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }

    fn sound_count(&self) -> usize {
        self.sounds.lock().unwrap().len()
    }

    fn clear(&self) {
        self.sounds.lock().unwrap().clear();
        self.notices.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotifyBackend for RecordingNotifier {
    async fn play_sound(&self, cue: &SoundCue) -> anyhow::Result<()> {
        self.sounds.lock().unwrap().push(*cue);
        Ok(())
    }

    async fn show_desktop(&self, notice: &DesktopNotice) -> anyhow::Result<()> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// Holds every desktop notification until the test gives up on it.
struct HangingNotifier;

#[async_trait]
impl NotifyBackend for HangingNotifier {
    async fn play_sound(&self, _cue: &SoundCue) -> anyhow::Result<()> {
        Ok(())
    }

    async fn show_desktop(&self, _notice: &DesktopNotice) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

fn hanging() -> Arc<dyn NotifyBackend> {
    Arc::new(HangingNotifier)
}

#[derive(Default)]
struct RecordingRenderer {
    rendered: Mutex<Vec<DailySummary>>,
    fail_next: Mutex<bool>,
    /// When set, the state file is replaced by a directory during rendering.
    obstruct_state: Mutex<Option<PathBuf>>,
}

#[async_trait]
impl SummaryRenderer for RecordingRenderer {
    async fn render(&self, summary: &DailySummary) -> anyhow::Result<()> {
        let mut fail = self.fail_next.lock().unwrap();
        if *fail {
            *fail = false;
            anyhow::bail!("report directory not writable");
        }
        if let Some(path) = self.obstruct_state.lock().unwrap().take() {
            obstruct(&path);
        }
        self.rendered.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

fn local(day: u32, h: u32, m: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(2025, 1, day, h, m, 0)
        .unwrap()
}

fn record(id: &str, level: &str, region: &str) -> RawRecord {
    RawRecord::new()
        .with("id", id)
        .with("level", level)
        .with("region", region)
        .with("comuna", "Talca")
        .with("causa", "Incendio forestal")
}

/// Put a non-empty directory where the state file goes so saving fails.
fn obstruct(path: &Path) {
    if path.is_file() {
        std::fs::remove_file(path).unwrap();
    }
    std::fs::create_dir_all(path).unwrap();
    std::fs::write(path.join("keep"), b"x").unwrap();
}

fn base_config(dir: &Path) -> MonitorConfig {
    let mut config = MonitorConfig {
        fetch: FetchConfig {
            file: Some(PathBuf::from("unused.json")),
            timeout_secs: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    config.paths.state_file = dir.join("state.json");
    config.paths.dashboard_file = Some(dir.join("dashboard_data.js"));
    config.summary.dir = dir.join("summaries");
    config
}

struct Harness {
    _dir: tempfile::TempDir,
    state_path: PathBuf,
    dashboard_path: PathBuf,
    feed: MemoryFeed,
    notifier: Arc<RecordingNotifier>,
    renderer: Arc<RecordingRenderer>,
    clock: Arc<ManualClock>,
    monitor: Monitor,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(adjust: impl FnOnce(&mut MonitorConfig)) -> Self {
        Self::build(adjust, None)
    }

    fn build(
        adjust: impl FnOnce(&mut MonitorConfig),
        backend: Option<Arc<dyn NotifyBackend>>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path());
        adjust(&mut config);
        let state_path = config.paths.state_file.clone();
        let dashboard_path = dir.path().join("dashboard_data.js");

        let feed = MemoryFeed::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let renderer = Arc::new(RecordingRenderer::default());
        let clock = Arc::new(ManualClock::new(local(15, 10, 0)));

        let loader = ConfigLoader::fixed(ResolvedConfig::resolve(config).unwrap());
        let backend: Arc<dyn NotifyBackend> = match backend {
            Some(backend) => backend,
            None => notifier.clone(),
        };
        let monitor = Monitor::new(Box::new(feed.clone()), loader, backend)
            .with_clock(clock.clone())
            .with_summary_renderer(renderer.clone());

        Self {
            _dir: dir,
            state_path,
            dashboard_path,
            feed,
            notifier,
            renderer,
            clock,
            monitor,
        }
    }

    fn store(&self) -> StateStore {
        StateStore::new(&self.state_path)
    }

    fn summaries(&self) -> usize {
        self.renderer.rendered.lock().unwrap().len()
    }
}

// ---------------------------------------------------------------------------
// Change detection through full cycles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_cycle_reports_every_alert_as_new() {
    let mut h = Harness::new();
    h.feed.set(vec![
        record("a", "roja", "Maule"),
        record("b", "amarilla", "Ñuble"),
    ]);

    let stats = h.monitor.run_cycle().await.unwrap();

    assert_eq!(stats.new, 2);
    assert_eq!(stats.active, 2);
    assert_eq!(h.notifier.titles(), vec!["NEW RED ALERT", "NEW YELLOW ALERT"]);

    let state = h.store().load();
    assert_eq!(state.snapshot.len(), 2);
    assert!(state.last_run_at.is_some());
    assert_eq!(state.day_log.events.len(), 2);
    assert_eq!(state.recent_changes.len(), 2);
}

#[tokio::test]
async fn repeated_fetch_is_all_unchanged() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);
    h.monitor.run_cycle().await.unwrap();
    h.notifier.clear();

    let stats = h.monitor.run_cycle().await.unwrap();

    assert_eq!(stats.unchanged, 1);
    assert!(!stats.has_changes());
    assert!(h.notifier.titles().is_empty());
    assert_eq!(h.store().load().recent_changes.len(), 1);
}

#[tokio::test]
async fn level_change_is_one_update() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "amarilla", "Maule")]);
    h.monitor.run_cycle().await.unwrap();
    let first_seen = h.store().load().snapshot.iter().next().unwrap().first_seen_at;
    h.notifier.clear();

    h.clock.advance(chrono::Duration::minutes(5));
    h.feed.set(vec![record("a", "roja", "Maule")]);
    let stats = h.monitor.run_cycle().await.unwrap();

    assert_eq!((stats.new, stats.updated, stats.cancelled), (0, 1, 0));
    let notices = h.notifier.notices.lock().unwrap().clone();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "UPDATED RED ALERT");
    assert!(notices[0].body.contains("level: yellow → red"));

    let state = h.store().load();
    let alert = state.snapshot.iter().next().unwrap();
    assert_eq!(alert.first_seen_at, first_seen);
    assert!(alert.last_seen_at > first_seen);
}

#[tokio::test]
async fn missing_alert_is_cancelled_and_dropped_from_state() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule"), record("b", "roja", "Maule")]);
    h.monitor.run_cycle().await.unwrap();
    h.notifier.clear();

    h.feed.set(vec![record("a", "roja", "Maule")]);
    let stats = h.monitor.run_cycle().await.unwrap();

    assert_eq!((stats.cancelled, stats.unchanged), (1, 1));
    assert_eq!(h.notifier.titles(), vec!["CANCELLED RED ALERT"]);
    assert_eq!(h.store().load().snapshot.len(), 1);
}

#[tokio::test]
async fn malformed_records_are_skipped() {
    let mut h = Harness::new();
    h.feed.set(vec![
        record("a", "roja", "Maule"),
        RawRecord::new().with("id", "b").with("region", "Maule"),
        record("c", "morada", "Maule"),
    ]);

    let stats = h.monitor.run_cycle().await.unwrap();

    assert_eq!(stats.fetched, 3);
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.new, 1);
}

#[tokio::test]
async fn state_survives_restart() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);
    h.monitor.run_cycle().await.unwrap();

    let config = ResolvedConfig::resolve(base_config(h.state_path.parent().unwrap())).unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut restarted = Monitor::new(
        Box::new(h.feed.clone()),
        ConfigLoader::fixed(config),
        notifier.clone(),
    )
    .with_clock(h.clock.clone())
    .with_summary_renderer(h.renderer.clone());

    let stats = restarted.run_cycle().await.unwrap();
    assert_eq!(stats.unchanged, 1);
    assert!(notifier.titles().is_empty());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_failure_leaves_state_untouched() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);
    h.monitor.run_cycle().await.unwrap();
    let before = std::fs::read(&h.state_path).unwrap();

    h.clock.advance(chrono::Duration::minutes(5));
    h.feed.fail("connection reset");
    let err = h.monitor.run_once().await.unwrap_err();

    assert!(matches!(err, MonitorError::Fetch(_)));
    assert_eq!(h.monitor.consecutive_failures(), 1);
    assert_eq!(h.monitor.phase(), MonitorPhase::Stopped);
    assert_eq!(std::fs::read(&h.state_path).unwrap(), before);
}

#[tokio::test]
async fn empty_feed_after_failure_is_not_mistaken_for_cancellation() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);
    h.monitor.run_cycle().await.unwrap();

    h.feed.fail("timeout");
    assert!(h.monitor.run_cycle().await.is_err());

    h.feed.set(vec![record("a", "roja", "Maule")]);
    let stats = h.monitor.run_cycle().await.unwrap();
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.cancelled, 0);
}

#[tokio::test]
async fn slow_fetch_times_out() {
    let mut h = Harness::new();
    h.feed.hang();

    let err = h.monitor.run_cycle().await.unwrap_err();
    assert!(matches!(err, MonitorError::FetchTimeout { secs: 1 }));
    assert!(err.is_fetch_failure());
    assert!(!h.state_path.exists());
}

#[tokio::test]
async fn failed_save_is_retried_with_the_same_events() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule"), record("b", "amarilla", "Maule")]);
    obstruct(&h.state_path);

    let err = h.monitor.run_cycle().await.unwrap_err();
    assert!(matches!(err, MonitorError::StateSave(_)));
    assert!(!err.is_fetch_failure());
    assert!(h.state_path.is_dir());

    std::fs::remove_dir_all(&h.state_path).unwrap();
    let stats = h.monitor.run_cycle().await.unwrap();
    assert_eq!(stats.new, 2);
    assert_eq!(h.store().load().snapshot.len(), 2);
    assert_eq!(h.store().load().day_log.events.len(), 2);
}

#[tokio::test]
async fn run_keeps_looping_after_failed_save() {
    let mut h = Harness::with_config(|c| c.interval_secs = 10);
    h.feed.set(vec![record("a", "roja", "Maule")]);
    obstruct(&h.state_path);
    let (tx, rx) = watch::channel(false);

    let stopper = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
    };
    let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(h.monitor.run(rx), stopper)
    })
    .await
    .expect("monitor did not stop");

    result.unwrap();
    assert_eq!(h.monitor.consecutive_failures(), 0);
    assert_eq!(h.monitor.phase(), MonitorPhase::Stopped);
}

#[tokio::test]
async fn undated_alert_ages_out() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);
    h.monitor.run_cycle().await.unwrap();

    h.clock.advance(chrono::Duration::days(10));
    let stats = h.monitor.run_cycle().await.unwrap();
    assert_eq!((stats.active, stats.stale), (1, 0));

    h.clock.advance(chrono::Duration::days(20));
    let stats = h.monitor.run_cycle().await.unwrap();
    assert_eq!(stats.stale, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.cancelled, 1);
    assert!(h.store().load().snapshot.is_empty());
}

// ---------------------------------------------------------------------------
// Notification bounds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hung_notifier_times_out_and_state_is_saved() {
    let mut h = Harness::build(
        |c| c.notifications.timeout_secs = 1,
        Some(hanging()),
    );
    h.feed.set(vec![record("a", "roja", "Maule")]);

    let stats = tokio::time::timeout(Duration::from_secs(10), h.monitor.run_cycle())
        .await
        .expect("notification stage was not bounded")
        .unwrap();

    assert_eq!(stats.notify.failures, 1);
    assert_eq!(stats.notify.desktop_sent, 0);
    assert_eq!(h.store().load().snapshot.len(), 1);
}

#[tokio::test]
async fn shutdown_during_notification_still_persists() {
    let mut h = Harness::build(
        |c| c.notifications.timeout_secs = 600,
        Some(hanging()),
    );
    h.feed.set(vec![record("a", "roja", "Maule")]);
    let (tx, rx) = watch::channel(false);

    let stopper = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
    };
    let (result, ()) = tokio::time::timeout(Duration::from_secs(3), async {
        tokio::join!(h.monitor.run(rx), stopper)
    })
    .await
    .expect("shutdown not observed while notifying");

    result.unwrap();
    assert_eq!(h.monitor.phase(), MonitorPhase::Stopped);
    let state = h.store().load();
    assert_eq!(state.snapshot.len(), 1);
    assert_eq!(state.recent_changes.len(), 1);
}

// ---------------------------------------------------------------------------
// Filters and quiet hours
// ---------------------------------------------------------------------------

#[tokio::test]
async fn filtered_alerts_are_remembered_but_not_announced() {
    let mut h = Harness::with_config(|c| c.regions = vec!["Ñuble".into()]);
    h.feed.set(vec![
        record("a", "roja", "Maule"),
        record("b", "roja", "Nuble"),
    ]);

    let stats = h.monitor.run_cycle().await.unwrap();

    assert_eq!(stats.filtered_out, 1);
    assert_eq!(h.notifier.titles().len(), 1);
    let state = h.store().load();
    assert_eq!(state.snapshot.len(), 2);
    assert_eq!(state.day_log.events.len(), 1);
    assert_eq!(state.day_log.events[0].region, "Nuble");
}

#[tokio::test]
async fn quiet_hours_suppress_sound_only() {
    let mut h = Harness::with_config(|c| {
        c.quiet_hours.enabled = true;
        c.notifications.sound = true;
    });
    h.clock.set(local(15, 0, 30));
    h.feed.set(vec![record("a", "roja", "Maule")]);

    let stats = h.monitor.run_cycle().await.unwrap();

    assert_eq!(h.notifier.sound_count(), 0);
    assert_eq!(stats.notify.suppressed_sounds, 1);
    assert_eq!(h.notifier.titles().len(), 1);

    h.clock.set(local(15, 12, 0));
    h.feed.set(vec![record("a", "roja", "Maule"), record("b", "roja", "Maule")]);
    h.monitor.run_cycle().await.unwrap();
    assert_eq!(h.notifier.sound_count(), 1);
}

// ---------------------------------------------------------------------------
// Daily summary
// ---------------------------------------------------------------------------

#[tokio::test]
async fn summary_generated_once_per_day() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);

    h.monitor.run_cycle().await.unwrap();
    assert_eq!(h.summaries(), 0);

    h.clock.set(local(15, 20, 5));
    let stats = h.monitor.run_cycle().await.unwrap();
    assert!(stats.summary_written);
    h.clock.set(local(15, 20, 10));
    h.monitor.run_cycle().await.unwrap();
    h.clock.set(local(15, 23, 55));
    h.monitor.run_cycle().await.unwrap();
    assert_eq!(h.summaries(), 1);

    let summary = h.renderer.rendered.lock().unwrap()[0].clone();
    assert_eq!(summary.by_kind.new, 1);
    assert_eq!(summary.active.len(), 1);
    assert_eq!(
        h.store().load().last_summary_date,
        Some(local(15, 0, 0).date_naive())
    );

    h.clock.set(local(16, 9, 0));
    h.monitor.run_cycle().await.unwrap();
    assert_eq!(h.summaries(), 1);
    h.clock.set(local(16, 20, 30));
    h.monitor.run_cycle().await.unwrap();
    assert_eq!(h.summaries(), 2);

    let second = h.renderer.rendered.lock().unwrap()[1].clone();
    assert_eq!(second.by_kind.total(), 0);
}

#[tokio::test]
async fn failed_summary_is_retried_next_cycle() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);
    h.clock.set(local(15, 21, 0));
    *h.renderer.fail_next.lock().unwrap() = true;

    let stats = h.monitor.run_cycle().await.unwrap();
    assert!(!stats.summary_written);
    assert_eq!(h.store().load().last_summary_date, None);

    h.monitor.run_cycle().await.unwrap();
    assert_eq!(h.summaries(), 1);
}

#[tokio::test]
async fn summary_date_survives_failed_save() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);
    h.monitor.run_cycle().await.unwrap();

    h.clock.set(local(15, 20, 30));
    *h.renderer.obstruct_state.lock().unwrap() = Some(h.state_path.clone());
    let stats = h.monitor.run_cycle().await.unwrap();
    assert!(stats.summary_written);
    assert!(h.state_path.is_dir());

    std::fs::remove_dir_all(&h.state_path).unwrap();
    h.clock.set(local(15, 20, 40));
    h.monitor.run_cycle().await.unwrap();

    assert_eq!(h.summaries(), 1);
    assert_eq!(
        h.store().load().last_summary_date,
        Some(local(15, 0, 0).date_naive())
    );
}

#[tokio::test]
async fn disabled_summary_never_runs() {
    let mut h = Harness::with_config(|c| c.summary.enabled = false);
    h.clock.set(local(15, 22, 0));
    h.monitor.run_cycle().await.unwrap();
    assert_eq!(h.summaries(), 0);
}

#[tokio::test]
async fn summarize_now_marks_the_day() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);
    h.monitor.run_cycle().await.unwrap();

    let summary = h.monitor.summarize_now().await.unwrap();
    assert_eq!(summary.by_kind.new, 1);
    assert_eq!(h.store().load().last_summary_date, Some(summary.date));

    h.clock.set(local(15, 21, 0));
    h.monitor.run_cycle().await.unwrap();
    assert_eq!(h.summaries(), 1);
}

// ---------------------------------------------------------------------------
// Export and loop control
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dashboard_is_exported_after_each_cycle() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);

    let stats = h.monitor.run_cycle().await.unwrap();
    assert!(stats.exported);

    let text = std::fs::read_to_string(&h.dashboard_path).unwrap();
    let json = text
        .strip_prefix("const D=")
        .and_then(|t| t.strip_suffix(';'))
        .unwrap();
    let data: serde_json::Value = serde_json::from_str(json).unwrap();
    assert_eq!(data["stats"]["red"], 1);
    assert_eq!(data["region_status"]["Maule"]["status"], "red");
    assert_eq!(data["changes"][0]["kind"], "new");
    assert_eq!(data["last_cycle_events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn shutdown_interrupts_in_flight_fetch() {
    let mut h = Harness::with_config(|c| c.fetch.timeout_secs = 600);
    h.feed.hang();
    let (tx, rx) = watch::channel(false);

    let stopper = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
    };
    let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(h.monitor.run(rx), stopper)
    })
    .await
    .expect("monitor did not stop");

    result.unwrap();
    assert_eq!(h.monitor.phase(), MonitorPhase::Stopped);
    assert!(!h.state_path.exists());
}

#[tokio::test]
async fn shutdown_interrupts_sleep() {
    let mut h = Harness::new();
    h.feed.set(vec![record("a", "roja", "Maule")]);
    let (tx, rx) = watch::channel(false);

    let stopper = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
    };
    let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(h.monitor.run(rx), stopper)
    })
    .await
    .expect("monitor did not stop");

    result.unwrap();
    assert_eq!(h.store().load().snapshot.len(), 1);
    assert_eq!(
        h.store().load().recent_changes[0].kind,
        ChangeKind::New
    );
}
