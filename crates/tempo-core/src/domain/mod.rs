//! Domain model: ids, jobs, task specifications and lifecycle status.

pub mod ids;
pub mod job;
pub mod spec;
pub mod state;

pub use ids::TaskId;
pub use job::{BlockingFn, CooperativeFn, Job, JobKind, JobResult};
pub use spec::{Priority, ScheduleAt, TaskOptions, TaskSpec};
pub use state::TaskStatus;
