//! Job: the opaque unit of work a task carries.
//!
//! The scheduler never looks inside a job. It only knows which execution
//! strategy the job wants and how to invoke it once per attempt.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

use crate::error::TaskError;

/// What one attempt of a job produces.
pub type JobResult = Result<serde_json::Value, TaskError>;

pub type BlockingFn = dyn Fn() -> JobResult + Send + Sync;
pub type CooperativeFn = dyn Fn() -> BoxFuture<'static, JobResult> + Send + Sync;

/// Which execution backend runs a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Runs on a dedicated worker thread.
    Blocking,

    /// Runs on the shared single-threaded event loop.
    Cooperative,
}

/// A callable unit of work.
///
/// Jobs are `Fn`, not `FnOnce`: a failed attempt is retried by invoking the
/// same job again. Arguments are whatever the closure captures.
#[derive(Clone)]
pub enum Job {
    Blocking(Arc<BlockingFn>),
    Cooperative(Arc<CooperativeFn>),
}

impl Job {
    /// Wrap a blocking function.
    ///
    /// The `Ok` value is serialized into the task's result; the `Err` value is
    /// rendered with `Display` into the task's error.
    pub fn blocking<F, T, E>(f: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        T: Serialize,
        E: fmt::Display,
    {
        Job::Blocking(Arc::new(move || into_job_result(f())))
    }

    /// Wrap a function returning a future; the future runs on the event loop.
    pub fn cooperative<F, Fut, T, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + 'static,
        E: fmt::Display + 'static,
    {
        Job::Cooperative(Arc::new(move || f().map(into_job_result).boxed()))
    }

    /// Bind `args` to a blocking function taking them by reference.
    pub fn blocking_with<A, F, T, E>(args: A, f: F) -> Self
    where
        A: Send + Sync + 'static,
        F: Fn(&A) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize,
        E: fmt::Display,
    {
        Job::blocking(move || f(&args))
    }

    /// Bind `args` to an async function; each attempt receives a fresh clone.
    pub fn cooperative_with<A, F, Fut, T, E>(args: A, f: F) -> Self
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + 'static,
        E: fmt::Display + 'static,
    {
        Job::cooperative(move || f(args.clone()))
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Job::Blocking(_) => JobKind::Blocking,
            Job::Cooperative(_) => JobKind::Cooperative,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Job").field(&self.kind()).finish()
    }
}

fn into_job_result<T: Serialize, E: fmt::Display>(result: Result<T, E>) -> JobResult {
    match result {
        Ok(value) => serde_json::to_value(value)
            .map_err(|e| TaskError::new(format!("result is not serializable: {e}"))),
        Err(e) => Err(TaskError::new(e.to_string())),
    }
}
