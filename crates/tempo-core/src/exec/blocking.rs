use std::sync::Arc;

use tracing::debug;

use super::event_loop::EventLoop;
use super::{CompletionSink, Executor, run_blocking};
use crate::domain::{Job, JobKind};
use crate::error::{Result, SchedulerError};
use crate::queue::Dispatch;

/// Runs blocking jobs on the event loop's blocking pool.
///
/// The pool is capped at the running-task budget, so every dispatched job
/// gets a thread right away.
pub struct BlockingExecutor {
    event_loop: Arc<EventLoop>,
    sink: Arc<dyn CompletionSink>,
}

impl BlockingExecutor {
    pub fn new(event_loop: Arc<EventLoop>, sink: Arc<dyn CompletionSink>) -> Self {
        Self { event_loop, sink }
    }
}

impl Executor for BlockingExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Blocking
    }

    fn run(&self, work: Dispatch) -> Result<()> {
        let Dispatch { id, job } = work;
        let Job::Blocking(f) = job else {
            return Err(SchedulerError::UnsupportedJob(job.kind()));
        };
        if self.event_loop.is_closed() {
            return Err(SchedulerError::ExecutorClosed);
        }
        let sink = Arc::clone(&self.sink);
        self.event_loop.handle().spawn_blocking(move || {
            debug!(task_id = %id, "running blocking task");
            let outcome = run_blocking(f.as_ref());
            sink.complete(id, outcome);
        });
        Ok(())
    }
}
