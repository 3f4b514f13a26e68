use std::sync::Arc;

use tracing::debug;

use super::event_loop::EventLoop;
use super::{CompletionSink, Executor, run_cooperative};
use crate::domain::{Job, JobKind};
use crate::error::{Result, SchedulerError};
use crate::queue::Dispatch;

/// Spawns cooperative jobs onto the event loop.
pub struct CooperativeExecutor {
    event_loop: Arc<EventLoop>,
    sink: Arc<dyn CompletionSink>,
}

impl CooperativeExecutor {
    pub fn new(event_loop: Arc<EventLoop>, sink: Arc<dyn CompletionSink>) -> Self {
        Self { event_loop, sink }
    }
}

impl Executor for CooperativeExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Cooperative
    }

    fn run(&self, work: Dispatch) -> Result<()> {
        let Dispatch { id, job } = work;
        let Job::Cooperative(f) = job else {
            return Err(SchedulerError::UnsupportedJob(job.kind()));
        };
        if self.event_loop.is_closed() {
            return Err(SchedulerError::ExecutorClosed);
        }
        let sink = Arc::clone(&self.sink);
        self.event_loop.handle().spawn(async move {
            debug!(task_id = %id, "running cooperative task");
            let outcome = run_cooperative(f.as_ref()).await;
            sink.complete(id, outcome);
        });
        Ok(())
    }
}
