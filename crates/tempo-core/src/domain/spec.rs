//! Task specification: what a caller hands to the admission gate.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::job::{Job, JobKind};
use crate::queue::RetryPolicy;

/// Priority levels. Any `i32` is accepted; higher is more urgent.
pub struct Priority;

impl Priority {
    pub const LOW: i32 = 1;
    pub const MEDIUM: i32 = 5;
    pub const HIGH: i32 = 10;
}

/// Seconds in one (non-leap) year. Numeric schedule times below this are
/// relative delays, anything else is a Unix timestamp.
pub const RELATIVE_DELAY_LIMIT_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// When a task may first run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ScheduleAt {
    #[default]
    Now,

    /// Relative delay from submission.
    After(Duration),

    /// Absolute point in time.
    At(DateTime<Utc>),

    /// Either a relative delay or a Unix timestamp, depending on magnitude.
    Seconds(f64),
}

impl ScheduleAt {
    /// Resolve to an absolute time relative to `now`.
    pub fn resolve(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ScheduleAt::Now => now,
            ScheduleAt::After(delay) => add_delay(now, delay),
            ScheduleAt::At(at) => at,
            ScheduleAt::Seconds(secs) if secs < RELATIVE_DELAY_LIMIT_SECS => {
                add_delay(now, Duration::from_secs_f64(secs.max(0.0)))
            }
            ScheduleAt::Seconds(secs) => {
                let millis = (secs * 1000.0) as i64;
                DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
        }
    }
}

/// `now + delay`, saturating at the largest representable time.
pub(crate) fn add_delay(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Scheduling attributes of a task: everything except the job itself.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOptions {
    pub priority: i32,
    pub schedule: ScheduleAt,
    pub retry: RetryPolicy,
    pub description: Option<String>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            priority: Priority::MEDIUM,
            schedule: ScheduleAt::Now,
            retry: RetryPolicy::default(),
            description: None,
        }
    }
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn schedule(mut self, at: ScheduleAt) -> Self {
        self.schedule = at;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Base delay of the exponential backoff.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Everything needed to create a task.
///
/// # Example
/// ```ignore
/// let spec = TaskSpec::new(Job::blocking(|| Ok::<_, String>(42)))
///     .priority(Priority::HIGH)
///     .schedule(ScheduleAt::After(Duration::from_secs(30)))
///     .description("nightly report");
/// let id = scheduler.submit(spec)?;
/// ```
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub job: Job,
    pub options: TaskOptions,
}

impl TaskSpec {
    pub fn new(job: Job) -> Self {
        Self::with_options(job, TaskOptions::default())
    }

    pub fn with_options(job: Job, options: TaskOptions) -> Self {
        Self { job, options }
    }

    pub fn priority(self, priority: i32) -> Self {
        self.map_options(|o| o.priority(priority))
    }

    pub fn schedule(self, at: ScheduleAt) -> Self {
        self.map_options(|o| o.schedule(at))
    }

    pub fn max_retries(self, max_retries: u32) -> Self {
        self.map_options(|o| o.max_retries(max_retries))
    }

    pub fn retry_delay(self, delay: Duration) -> Self {
        self.map_options(|o| o.retry_delay(delay))
    }

    pub fn retry_policy(self, policy: RetryPolicy) -> Self {
        self.map_options(|o| o.retry_policy(policy))
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.map_options(|o| o.description(description))
    }

    pub fn kind(&self) -> JobKind {
        self.job.kind()
    }

    fn map_options(mut self, f: impl FnOnce(TaskOptions) -> TaskOptions) -> Self {
        self.options = f(self.options);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[rstest]
    #[case::now(ScheduleAt::Now, 0)]
    #[case::after(ScheduleAt::After(Duration::from_secs(100)), 100)]
    #[case::small_number_is_delay(ScheduleAt::Seconds(30.0), 30)]
    #[case::just_below_a_year(ScheduleAt::Seconds(RELATIVE_DELAY_LIMIT_SECS - 1.0), 365 * 24 * 3600 - 1)]
    #[case::negative_delay_clamps(ScheduleAt::Seconds(-5.0), 0)]
    fn relative_schedules(#[case] at: ScheduleAt, #[case] offset_secs: i64) {
        assert_eq!(at.resolve(now()), now() + TimeDelta::seconds(offset_secs));
    }

    #[test]
    fn large_number_is_unix_timestamp() {
        let ts = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap();
        let at = ScheduleAt::Seconds(ts.timestamp() as f64);
        assert_eq!(at.resolve(now()), ts);
    }

    #[test]
    fn absolute_time_is_kept() {
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(ScheduleAt::At(ts).resolve(now()), ts);
    }

    #[test]
    fn spec_defaults() {
        let spec = TaskSpec::new(Job::blocking(|| Ok::<_, String>(())));
        assert_eq!(spec.options, TaskOptions::default());
        assert_eq!(spec.options.priority, Priority::MEDIUM);
        assert_eq!(spec.options.schedule, ScheduleAt::Now);
        assert_eq!(spec.options.retry.max_retries, 3);
        assert_eq!(spec.options.retry.base_delay, Duration::from_secs(5));
        assert_eq!(spec.kind(), JobKind::Blocking);
        assert!(spec.options.description.is_none());
    }

    #[test]
    fn spec_builder_updates_options() {
        let spec = TaskSpec::new(Job::cooperative(|| async { Ok::<_, String>(()) }))
            .priority(Priority::HIGH)
            .max_retries(0)
            .retry_delay(Duration::from_millis(250))
            .description("nightly report");
        assert_eq!(spec.options.priority, 10);
        assert_eq!(spec.options.retry.max_retries, 0);
        assert_eq!(spec.options.retry.base_delay, Duration::from_millis(250));
        assert_eq!(spec.options.description.as_deref(), Some("nightly report"));
        assert_eq!(spec.kind(), JobKind::Cooperative);
    }
}
