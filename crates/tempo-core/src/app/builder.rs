//! SchedulerBuilder - wiring of config, ports and executors.
//!
//! Fails fast: an invalid config is rejected by `build()` before any thread
//! is spawned.

use std::sync::Arc;

use super::scheduler::{Scheduler, Shared};
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::exec::{CompletionSink, Executors};
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

/// Builds a [`Scheduler`].
///
/// ```ignore
/// let scheduler = Scheduler::builder()
///     .config(SchedulerConfig::from_file("scheduler.toml")?)
///     .build()?;
/// scheduler.start()?;
/// ```
///
/// The clock defaults to the system clock and ids to time-ordered ULIDs
/// drawn from that clock. Tests swap in a `FixedClock`.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Box<dyn IdGenerator>>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            clock: None,
            ids: None,
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Box::new(ids));
        self
    }

    /// Validate the config and spawn both executors.
    ///
    /// The scheduling worker is not started; call [`Scheduler::start`] or
    /// drive it by hand with [`Scheduler::tick`].
    pub fn build(self) -> Result<Scheduler> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Box::new(UlidGenerator::new(Arc::clone(&clock))));
        let workers = self.config.max_running_tasks;

        let shared = Arc::new(Shared::new(self.config, clock, ids)?);
        let sink: Arc<dyn CompletionSink> = shared.clone();
        let executors = Executors::start(workers, sink)?;
        Ok(Scheduler::from_parts(shared, executors))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use crate::error::SchedulerError;
    use std::time::Duration;
    use ulid::Ulid;

    struct SequentialIds;

    impl IdGenerator for SequentialIds {
        fn generate_task_id(&self) -> TaskId {
            TaskId::from_ulid(Ulid::from_parts(0, 7))
        }
    }

    #[test]
    fn build_with_defaults() {
        let scheduler = SchedulerBuilder::new().build().unwrap();
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.config(), &SchedulerConfig::default());
    }

    #[test]
    fn build_rejects_invalid_config() {
        let result = SchedulerBuilder::new()
            .config(SchedulerConfig {
                max_running_tasks: 0,
                ..SchedulerConfig::default()
            })
            .build();
        assert!(matches!(result, Err(SchedulerError::Config(_))));

        let result = SchedulerBuilder::new()
            .config(SchedulerConfig {
                check_interval_secs: 1e20,
                ..SchedulerConfig::default()
            })
            .build();
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }

    #[test]
    fn build_stores_checked_durations() {
        let scheduler = SchedulerBuilder::new()
            .config(SchedulerConfig {
                check_interval_secs: 0.5,
                shutdown_grace_secs: 2.0,
                ..SchedulerConfig::default()
            })
            .build()
            .unwrap();
        let handle = scheduler.handle();
        assert_eq!(handle.shared.check_interval, Duration::from_millis(500));
        assert_eq!(handle.shared.shutdown_grace, Duration::from_secs(2));
    }

    #[test]
    fn custom_id_generator_is_used() {
        let scheduler = SchedulerBuilder::new()
            .id_generator(SequentialIds)
            .build()
            .unwrap();
        let id = scheduler
            .schedule(|| Ok::<_, String>(()), Default::default())
            .unwrap();
        assert_eq!(id, TaskId::from_ulid(Ulid::from_parts(0, 7)));
    }
}
