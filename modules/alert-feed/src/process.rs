use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{FeedError, Result};
use crate::types::RawRecord;
use crate::{parse_records, AlertSource};

/// Placeholder substituted in extractor arguments.
const MAX_AGE_PLACEHOLDER: &str = "{max_age_days}";

/// Runs an external extractor (typically the headless-browser scraper) and
/// reads the records it prints to stdout as JSON.
pub struct CommandFeed {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandFeed {
    /// `command[0]` is the program, the rest are its arguments. Any argument
    /// equal to or containing `{max_age_days}` gets the requested age.
    pub fn new(command: &[String], timeout: Duration) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| FeedError::Process("empty extractor command".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    fn render_args(&self, max_age_days: u32) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(MAX_AGE_PLACEHOLDER, &max_age_days.to_string()))
            .collect()
    }
}

#[async_trait]
impl AlertSource for CommandFeed {
    fn name(&self) -> &str {
        "command"
    }

    async fn fetch_alerts(&self, max_age_days: u32) -> Result<Vec<RawRecord>> {
        let args = self.render_args(max_age_days);
        info!(program = self.program.as_str(), "Running alert extractor");

        let result = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.program)
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(FeedError::Process(format!(
                    "failed to launch {}: {e}",
                    self.program
                )))
            }
            Err(_) => {
                return Err(FeedError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(program = self.program.as_str(), stderr = %stderr, "Extractor exited with error");
            return Err(FeedError::Process(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let records = parse_records(&output.stdout)?;
        info!(records = records.len(), "Extractor finished");
        Ok(records)
    }
}
