//! Function wrappers: turn a plain function into one that schedules itself.
//!
//! ```ignore
//! let send_report = handle.task_fn("send_report", TaskOptions::new().priority(Priority::HIGH),
//!     |to: &String| mailer::send(to));
//! let id = send_report("ops@example.com".to_string())?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use super::scheduler::SchedulerHandle;
use crate::domain::{Job, TaskId, TaskOptions, TaskSpec};
use crate::error::Result;

impl SchedulerHandle {
    /// Wrap a blocking function. Each call of the returned closure submits
    /// one task with the call's arguments bound and returns its id.
    ///
    /// Without an explicit description the task is described as
    /// `"Task for <name>"`.
    pub fn task_fn<A, F, T, E>(
        &self,
        name: &str,
        options: TaskOptions,
        f: F,
    ) -> impl Fn(A) -> Result<TaskId> + Send + Sync + use<A, F, T, E>
    where
        A: Send + Sync + 'static,
        F: Fn(&A) -> std::result::Result<T, E> + Send + Sync + 'static,
        T: Serialize + 'static,
        E: fmt::Display + 'static,
    {
        let handle = self.clone();
        let options = with_default_description(options, format!("Task for {name}"));
        let f = Arc::new(f);
        move |args: A| {
            let f = Arc::clone(&f);
            let job = Job::blocking_with(args, move |a: &A| (*f)(a));
            handle.submit(TaskSpec::with_options(job, options.clone()))
        }
    }

    /// Async counterpart of [`SchedulerHandle::task_fn`]; the task runs on the
    /// event loop and is described as `"Async task for <name>"` by default.
    pub fn async_task_fn<A, F, Fut, T, E>(
        &self,
        name: &str,
        options: TaskOptions,
        f: F,
    ) -> impl Fn(A) -> Result<TaskId> + Send + Sync + use<A, F, Fut, T, E>
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Serialize + 'static,
        E: fmt::Display + 'static,
    {
        let handle = self.clone();
        let options = with_default_description(options, format!("Async task for {name}"));
        let f = Arc::new(f);
        move |args: A| {
            let f = Arc::clone(&f);
            let job = Job::cooperative_with(args, move |a: A| (*f)(a));
            handle.submit(TaskSpec::with_options(job, options.clone()))
        }
    }
}

fn with_default_description(options: TaskOptions, fallback: String) -> TaskOptions {
    if options.description.is_some() {
        options
    } else {
        options.description(fallback)
    }
}
