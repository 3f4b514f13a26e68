//! Scheduler configuration.
//!
//! Read once at construction. Values come from the `[task_scheduler]` table
//! of a TOML document; missing keys (or a missing table) use the defaults.
//!
//! ```toml
//! [task_scheduler]
//! check_interval_secs = 1.0
//! max_pending_tasks = 1000
//! max_running_tasks = 10
//! task_history_size = 1000
//! tie_break = "fifo"
//! shutdown_grace_secs = 5.0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};
use crate::queue::TieBreak;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the scheduling loop scans pending tasks.
    pub check_interval_secs: f64,

    /// Admission bound on the pending list.
    pub max_pending_tasks: usize,

    /// Concurrency budget; also the size of the blocking worker pool.
    pub max_running_tasks: usize,

    /// Records kept per terminal bucket (completed, failed).
    pub task_history_size: usize,

    pub tie_break: TieBreak,

    /// How long shutdown waits for running tasks before abandoning them.
    pub shutdown_grace_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 1.0,
            max_pending_tasks: 1000,
            max_running_tasks: 10,
            task_history_size: 1000,
            tie_break: TieBreak::Fifo,
            shutdown_grace_secs: 5.0,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    task_scheduler: SchedulerConfig,
}

impl SchedulerConfig {
    /// Parse the `[task_scheduler]` table out of a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(s).map_err(|e| SchedulerError::Config(format!("TOML parse error: {e}")))?;
        file.task_scheduler.validate()?;
        Ok(file.task_scheduler)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.check_interval()?;
        if self.max_running_tasks == 0 {
            return Err(SchedulerError::Config(
                "max_running_tasks must be at least 1".to_string(),
            ));
        }
        self.shutdown_grace()?;
        Ok(())
    }

    pub fn check_interval(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.check_interval_secs) {
            Ok(interval) if !interval.is_zero() => Ok(interval),
            _ => Err(SchedulerError::Config(format!(
                "check_interval_secs must be a positive number of seconds, got {}",
                self.check_interval_secs
            ))),
        }
    }

    pub fn shutdown_grace(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.shutdown_grace_secs).map_err(|_| {
            SchedulerError::Config(format!(
                "shutdown_grace_secs must be a non-negative number of seconds, got {}",
                self.shutdown_grace_secs
            ))
        })
    }
}
