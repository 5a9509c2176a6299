//! Change detection and monitoring loop for a public emergency-alert feed.
//!
//! Each cycle fetches raw records, normalizes them into a [`types::Snapshot`],
//! diffs it against the persisted one, notifies about what changed and persists
//! the result. A daily summary and a dashboard data file are produced along the way.

pub mod clock;
pub mod config;
pub mod diff;
pub mod error;
pub mod export;
pub mod filter;
pub mod monitor;
pub mod normalize;
pub mod notify;
pub mod quiet_hours;
pub mod state;
pub mod summary;
pub mod types;

pub use config::{ConfigLoader, ConfigOverrides, MonitorConfig, ResolvedConfig};
pub use error::{MonitorError, NormalizeError, StoreError};
pub use monitor::{CycleStats, Monitor, MonitorPhase};
pub use types::{Alert, AlertLevel, ChangeEvent, ChangeKind, Snapshot};
