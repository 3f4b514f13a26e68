//! Execution backends.
//!
//! Two strategies behind one [`Executor`] interface, picked by [`JobKind`]:
//! - [`BlockingExecutor`]: the event loop's blocking pool, one thread per
//!   running blocking job up to the running-task budget.
//! - [`CooperativeExecutor`]: futures spawned onto the single-threaded
//!   [`EventLoop`], interleaving at their await points.
//!
//! Executors only run jobs. They report every outcome to a
//! [`CompletionSink`] and never touch task state themselves.

mod blocking;
mod cooperative;
mod event_loop;

pub use blocking::BlockingExecutor;
pub use cooperative::CooperativeExecutor;
pub use event_loop::EventLoop;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;

use crate::domain::{BlockingFn, CooperativeFn, JobKind, JobResult, TaskId};
use crate::error::{Result, TaskError};
use crate::queue::Dispatch;

/// Receives the outcome of every attempt an executor runs.
pub trait CompletionSink: Send + Sync {
    fn complete(&self, id: TaskId, outcome: JobResult);
}

/// An execution strategy.
pub trait Executor: Send + Sync {
    /// The job kind this executor accepts.
    fn kind(&self) -> JobKind;

    /// Start running `work`. Returns without waiting for the job.
    ///
    /// Fails with `UnsupportedJob` for the other kind and with
    /// `ExecutorClosed` once the event loop is closed.
    fn run(&self, work: Dispatch) -> Result<()>;
}

/// Both backends, sharing one event loop.
pub struct Executors {
    event_loop: Arc<EventLoop>,
    blocking: BlockingExecutor,
    cooperative: CooperativeExecutor,
}

impl Executors {
    pub fn start(blocking_threads: usize, sink: Arc<dyn CompletionSink>) -> Result<Self> {
        let event_loop = Arc::new(EventLoop::spawn(blocking_threads)?);
        Ok(Self {
            blocking: BlockingExecutor::new(Arc::clone(&event_loop), Arc::clone(&sink)),
            cooperative: CooperativeExecutor::new(Arc::clone(&event_loop), sink),
            event_loop,
        })
    }

    pub fn for_kind(&self, kind: JobKind) -> &dyn Executor {
        match kind {
            JobKind::Blocking => &self.blocking,
            JobKind::Cooperative => &self.cooperative,
        }
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Stop accepting work and shut the event loop down.
    pub fn close(&self) {
        self.event_loop.close();
    }
}

/// Run one attempt on the calling thread. Panics become task faults.
pub(crate) fn run_blocking(f: &BlockingFn) -> JobResult {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)))
}

/// Run one attempt as a future. Panics become task faults.
pub(crate) async fn run_cooperative(f: &CooperativeFn) -> JobResult {
    AssertUnwindSafe(async move { f().await })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)))
}
