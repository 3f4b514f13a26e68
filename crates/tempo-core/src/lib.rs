//! tempo-core
//!
//! In-process task scheduler: delayed and prioritized tasks, a bounded
//! number running at once, automatic retry with exponential backoff, and a
//! queryable history.
//!
//! # Modules
//! - **domain**: task ids, jobs, statuses, scheduling options
//! - **queue**: task records, the four buckets, ordering and retry policy
//! - **exec**: the event loop runtime, its bounded blocking pool and the two executors
//! - **app**: builder, scheduler, handle and the scheduling worker
//! - **ports**: clock and id generator seams
//! - **config**: `[task_scheduler]` settings
//!
//! ```ignore
//! let scheduler = Scheduler::builder().build()?;
//! scheduler.start()?;
//! let id = scheduler.schedule(|| Ok::<_, String>(42), TaskOptions::new().priority(Priority::HIGH))?;
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod exec;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{Scheduler, SchedulerBuilder, SchedulerHandle, ShutdownReport, TickReport};
pub use config::SchedulerConfig;
pub use domain::{Job, JobKind, Priority, ScheduleAt, TaskId, TaskOptions, TaskSpec, TaskStatus};
pub use error::{Result, SchedulerError, TaskError};
pub use observability::SchedulerCounts;
pub use queue::{RetryPolicy, TaskSnapshot, TieBreak};
