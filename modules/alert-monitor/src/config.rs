use std::path::{Path, PathBuf};
use std::time::Duration;

use alert_feed::{AlertSource, CommandFeed, FileFeed, HttpFeed};
use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use tracing::{info, warn};

use crate::export::DEFAULT_REGIONS;
use crate::filter::AlertFilter;
use crate::quiet_hours::QuietHours;

const MIN_INTERVAL_SECS: u64 = 10;

/// TOML-backed monitor configuration. Every field has a default.
/// Secrets (webhook URL, feed token) stay as env vars.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub max_alert_age_days: u32,
    /// Region allow-list. Empty means all regions.
    pub regions: Vec<String>,
    /// Level or threat-type allow-list. Empty means all.
    pub types: Vec<String>,
    /// Regions always listed on the dashboard.
    pub known_regions: Vec<String>,
    pub quiet_hours: QuietHoursConfig,
    pub summary: SummaryConfig,
    pub notifications: NotificationConfig,
    pub paths: PathsConfig,
    pub fetch: FetchConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            max_alert_age_days: 14,
            regions: Vec::new(),
            types: Vec::new(),
            known_regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
            quiet_hours: QuietHoursConfig::default(),
            summary: SummaryConfig::default(),
            notifications: NotificationConfig::default(),
            paths: PathsConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QuietHoursConfig {
    pub enabled: bool,
    pub start: String,
    pub end: String,
    pub desktop_during_quiet_hours: bool,
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "23:00".to_string(),
            end: "07:00".to_string(),
            desktop_during_quiet_hours: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SummaryConfig {
    pub enabled: bool,
    /// Local time of day, `HH:MM`.
    pub time: String,
    pub dir: PathBuf,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time: "20:00".to_string(),
            dir: PathBuf::from("summaries"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NotificationConfig {
    pub sound: bool,
    pub desktop: bool,
    /// Empty rings the terminal bell.
    pub sound_command: Vec<String>,
    pub desktop_command: Vec<String>,
    pub command_timeout_secs: u64,
    /// Upper bound on one notification across every backend.
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sound: false,
            desktop: true,
            sound_command: Vec::new(),
            desktop_command: [
                "notify-send",
                "--app-name=alert-monitor",
                "--urgency={urgency}",
                "--expire-time={expire_ms}",
                "{title}",
                "{body}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            command_timeout_secs: 10,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PathsConfig {
    pub state_file: PathBuf,
    /// `None` disables the dashboard export.
    pub dashboard_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("alert_state.json"),
            dashboard_file: Some(PathBuf::from("dashboard_data.js")),
        }
    }
}

/// Where raw records come from. Exactly one of `url`, `command` or `file`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FetchConfig {
    pub url: Option<String>,
    pub command: Option<Vec<String>>,
    pub file: Option<PathBuf>,
    pub timeout_secs: u64,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: None,
            command: None,
            file: None,
            timeout_secs: 120,
            backoff_base_secs: 60,
            backoff_max_secs: 900,
        }
    }
}

impl FetchConfig {
    fn source_count(&self) -> usize {
        [self.url.is_some(), self.command.is_some(), self.file.is_some()]
            .iter()
            .filter(|set| **set)
            .count()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the configured feed. `token` is sent as a bearer token to HTTP feeds.
    pub fn build_source(&self, token: Option<&str>) -> Result<Box<dyn AlertSource>> {
        if let Some(url) = &self.url {
            let feed = HttpFeed::new(url, token, self.timeout())
                .with_context(|| format!("Failed to build HTTP feed for {url}"))?;
            return Ok(Box::new(feed));
        }
        if let Some(argv) = &self.command {
            let feed = CommandFeed::new(argv, self.timeout()).context("Invalid fetch command")?;
            return Ok(Box::new(feed));
        }
        if let Some(path) = &self.file {
            return Ok(Box::new(FileFeed::new(path)));
        }
        bail!("no fetch source configured (set fetch.url, fetch.command or fetch.file)")
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub interval_secs: Option<u64>,
    pub max_alert_age_days: Option<u32>,
    pub sound: Option<bool>,
    pub state_file: Option<PathBuf>,
    /// Used only when the file names no fetch source.
    pub feed_url: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut MonitorConfig) {
        if let Some(secs) = self.interval_secs {
            config.interval_secs = secs;
        }
        if let Some(days) = self.max_alert_age_days {
            config.max_alert_age_days = days;
        }
        if let Some(sound) = self.sound {
            config.notifications.sound = sound;
        }
        if let Some(path) = &self.state_file {
            config.paths.state_file = path.clone();
        }
        if config.fetch.source_count() == 0 {
            config.fetch.url = self.feed_url.clone();
        }
    }
}

/// A validated config with its derived, typed views.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub raw: MonitorConfig,
    pub quiet_hours: QuietHours,
    pub summary_time: NaiveTime,
    pub filter: AlertFilter,
}

impl ResolvedConfig {
    pub fn resolve(raw: MonitorConfig) -> Result<Self> {
        if raw.interval_secs < MIN_INTERVAL_SECS {
            bail!(
                "interval_secs must be at least {MIN_INTERVAL_SECS} (got {})",
                raw.interval_secs
            );
        }
        match raw.fetch.source_count() {
            1 => {}
            0 => bail!("no fetch source configured (set fetch.url, fetch.command or fetch.file)"),
            _ => bail!("only one of fetch.url, fetch.command and fetch.file may be set"),
        }
        if raw.fetch.command.as_ref().is_some_and(|c| c.is_empty()) {
            bail!("fetch.command must not be empty");
        }
        if raw.fetch.timeout_secs == 0 {
            bail!("fetch.timeout_secs must be positive");
        }
        if raw.notifications.timeout_secs == 0 || raw.notifications.command_timeout_secs == 0 {
            bail!("notifications.timeout_secs and command_timeout_secs must be positive");
        }
        let fetch = &raw.fetch;
        if fetch.backoff_base_secs == 0 || fetch.backoff_max_secs < fetch.backoff_base_secs {
            bail!("fetch backoff must satisfy 0 < backoff_base_secs <= backoff_max_secs");
        }

        let quiet_hours = QuietHours {
            enabled: raw.quiet_hours.enabled,
            start: parse_hhmm(&raw.quiet_hours.start).context("quiet_hours.start")?,
            end: parse_hhmm(&raw.quiet_hours.end).context("quiet_hours.end")?,
            desktop_during_quiet_hours: raw.quiet_hours.desktop_during_quiet_hours,
        };
        let summary_time = parse_hhmm(&raw.summary.time).context("summary.time")?;
        let filter = AlertFilter::new(&raw.regions, &raw.types);

        Ok(Self {
            raw,
            quiet_hours,
            summary_time,
            filter,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.raw.interval_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.raw.notifications.timeout_secs)
    }
}

/// Parse a local time of day written as `HH:MM`.
pub fn parse_hhmm(text: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
        .with_context(|| format!("invalid time `{text}`, expected HH:MM"))
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<MonitorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: MonitorConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Re-reads the config file each cycle, keeping the last good version on failure.
#[derive(Debug)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    overrides: ConfigOverrides,
    current: ResolvedConfig,
}

impl ConfigLoader {
    /// Initial load. Errors here are fatal.
    pub fn new(path: Option<PathBuf>, overrides: ConfigOverrides) -> Result<Self> {
        let current = Self::read(path.as_deref(), &overrides)?;
        Ok(Self {
            path,
            overrides,
            current,
        })
    }

    /// A loader with no file behind it; `reload` always returns the same config.
    pub fn fixed(config: ResolvedConfig) -> Self {
        Self {
            path: None,
            overrides: ConfigOverrides::default(),
            current: config,
        }
    }

    pub fn current(&self) -> &ResolvedConfig {
        &self.current
    }

    pub fn reload(&mut self) -> &ResolvedConfig {
        let Some(path) = self.path.as_deref() else {
            return &self.current;
        };
        match Self::read(Some(path), &self.overrides) {
            Ok(config) => {
                if config.raw != self.current.raw {
                    info!(path = %path.display(), "Configuration reloaded");
                    if config.raw.fetch != self.current.raw.fetch {
                        warn!("Fetch settings changed; restart to switch the feed source");
                    }
                }
                self.current = config;
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Keeping last good configuration");
            }
        }
        &self.current
    }

    fn read(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
        let mut raw = match path {
            Some(path) => load_config(path)?,
            None => MonitorConfig::default(),
        };
        overrides.apply(&mut raw);
        ResolvedConfig::resolve(raw)
    }
}
