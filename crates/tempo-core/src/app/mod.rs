//! App - the scheduler itself.
//!
//! # Components
//! - **SchedulerBuilder**: wiring of config, clock, id generator and executors
//! - **Scheduler**: owns the scheduling worker and both execution backends
//! - **SchedulerHandle**: cloneable API for submitting and inspecting tasks
//! - **Ticker**: the periodic scheduling worker
//! - **task_fn**: wrappers that turn functions into self-scheduling ones

pub mod builder;
pub mod scheduler;
mod task_fn;
mod ticker;

pub use self::builder::SchedulerBuilder;
pub use self::scheduler::{Scheduler, SchedulerHandle, ShutdownReport, TickReport};
