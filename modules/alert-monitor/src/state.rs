//! Durable monitor state.
//!
//! A single JSON file rewritten atomically after each completed cycle: the new
//! content goes to a temp file in the same directory, is fsynced, then renamed over
//! the old one. A crash at any point leaves either the old or the new file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::types::{ChangeRecord, DayLog, Snapshot};

pub const SCHEMA_VERSION: u32 = 1;

/// Length of the change history kept on disk.
pub const MAX_RECENT_CHANGES: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub schema_version: u32,
    /// Unfiltered snapshot of the last successful cycle.
    #[serde(default)]
    pub snapshot: Snapshot,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_summary_date: Option<NaiveDate>,
    #[serde(default)]
    pub day_log: DayLog,
    #[serde(default)]
    pub recent_changes: Vec<ChangeRecord>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            snapshot: Snapshot::default(),
            last_run_at: None,
            last_summary_date: None,
            day_log: DayLog::default(),
            recent_changes: Vec::new(),
        }
    }
}

impl PersistedState {
    /// Append to the change history, dropping the oldest entries past the cap.
    pub fn record_changes(&mut self, records: impl IntoIterator<Item = ChangeRecord>) {
        self.recent_changes.extend(records);
        if self.recent_changes.len() > MAX_RECENT_CHANGES {
            let excess = self.recent_changes.len() - MAX_RECENT_CHANGES;
            self.recent_changes.drain(..excess);
        }
    }
}

/// Loads and saves [`PersistedState`] at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state, falling back to an empty state if the file is missing or unusable.
    pub fn load(&self) -> PersistedState {
        match self.try_load() {
            Ok(Some(state)) => state,
            Ok(None) => {
                info!(path = %self.path.display(), "No state file yet, starting empty");
                PersistedState::default()
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unusable state file, starting empty");
                PersistedState::default()
            }
        }
    }

    /// Strict load: `Ok(None)` when absent, `Err` when present but unusable.
    pub fn try_load(&self) -> Result<Option<PersistedState>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.corrupt(e.to_string())),
        };

        let state: PersistedState =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;

        if state.schema_version != SCHEMA_VERSION {
            return Err(self.corrupt(format!(
                "unsupported schema version {} (expected {SCHEMA_VERSION})",
                state.schema_version
            )));
        }

        debug!(
            path = %self.path.display(),
            alerts = state.snapshot.len(),
            "Loaded state"
        );
        Ok(Some(state))
    }

    /// Atomically replace the state file.
    pub fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &bytes).map_err(|source| StoreError::Save {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Saved state");
        Ok(())
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }
}

/// Write `bytes` to `path` via temp file + fsync + rename in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    #[cfg(unix)]
    {
        if let Ok(d) = std::fs::File::open(dir) {
            let _ = d.sync_all();
        }
    }

    Ok(())
}
