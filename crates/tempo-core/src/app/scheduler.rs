//! Scheduler - admission, dispatch, settlement, queries.
//!
//! # Locking
//! All four buckets sit behind one mutex. Every operation holds it only for
//! the bucket mutation; jobs always run with the lock released.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::builder::SchedulerBuilder;
use super::ticker::Ticker;
use crate::config::SchedulerConfig;
use crate::domain::{Job, JobResult, TaskId, TaskOptions, TaskSpec, TaskStatus};
use crate::error::{Result, SchedulerError, TaskError};
use crate::exec::{CompletionSink, Executor, Executors};
use crate::observability::SchedulerCounts;
use crate::ports::{Clock, IdGenerator};
use crate::queue::{Bucket, CancelOutcome, Settled, TaskBuckets, TaskSnapshot};

/// State shared by the public handle, the ticker and the executors.
pub(crate) struct Shared {
    pub(crate) config: SchedulerConfig,
    pub(crate) check_interval: Duration,
    pub(crate) shutdown_grace: Duration,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Box<dyn IdGenerator>,
    buckets: Mutex<TaskBuckets>,
    /// Signalled whenever a running task settles.
    settled: Condvar,
}

/// What one scheduling cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub evicted: usize,
}

impl Shared {
    /// Fails if the config's durations are out of range.
    pub(crate) fn new(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        ids: Box<dyn IdGenerator>,
    ) -> Result<Self> {
        Ok(Self {
            check_interval: config.check_interval()?,
            shutdown_grace: config.shutdown_grace()?,
            config,
            clock,
            ids,
            buckets: Mutex::new(TaskBuckets::new()),
            settled: Condvar::new(),
        })
    }

    /// A panicking job never runs under this lock, so a poisoned guard
    /// still holds consistent buckets.
    fn buckets(&self) -> MutexGuard<'_, TaskBuckets> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One scheduling cycle: dispatch eligible tasks, then trim history.
    pub(crate) fn tick(&self, executors: &Executors) -> TickReport {
        let now = self.clock.now();
        let dispatches = self.buckets().take_eligible(
            now,
            self.config.max_running_tasks,
            self.config.tie_break,
        );

        let dispatched = dispatches.len();
        for work in dispatches {
            let id = work.id;
            let kind = work.job.kind();
            debug!(task_id = %id, ?kind, "dispatching task");
            if let Err(e) = executors.for_kind(kind).run(work) {
                error!(task_id = %id, error = %e, "failed to hand task to executor");
                self.complete(id, Err(TaskError::new(e.to_string())));
            }
        }

        let evicted = self.buckets().reap(self.config.task_history_size);
        if evicted > 0 {
            debug!(evicted, "trimmed task history");
        }
        TickReport { dispatched, evicted }
    }

    /// Block until nothing is running, or until `timeout` passes.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = self.buckets();
        let (guard, _) = self
            .settled
            .wait_timeout_while(guard, timeout, |b| b.running_len() > 0)
            .unwrap_or_else(|e| e.into_inner());
        guard.running_len() == 0
    }

    pub(crate) fn running_ids(&self) -> Vec<TaskId> {
        self.buckets().running_ids()
    }
}

impl CompletionSink for Shared {
    fn complete(&self, id: TaskId, outcome: JobResult) {
        let now = self.clock.now();
        let settled = self.buckets().settle(id, outcome, now);
        self.settled.notify_all();

        match settled {
            None => warn!(task_id = %id, "completion for a task that is not running"),
            Some(Settled::Completed) => debug!(task_id = %id, "task completed"),
            Some(Settled::Retrying {
                retries,
                max_retries,
                next_at,
                error,
            }) => warn!(
                task_id = %id,
                retries,
                max_retries,
                %next_at,
                %error,
                "task failed, will retry"
            ),
            Some(Settled::Failed { retries, error }) => error!(
                task_id = %id,
                retries,
                %error,
                "task failed permanently"
            ),
        }
    }
}

/// Cheap, cloneable entry point to a scheduler's tasks.
///
/// Hand this to callers that submit or inspect work; it stays valid for as
/// long as any clone exists, even after the scheduler shut down (tasks are
/// then accepted but never dispatched).
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Admission gate. Fails with `QueueFull` when the pending list is at
    /// capacity; the task is visible to queries as soon as this returns.
    pub fn submit(&self, spec: TaskSpec) -> Result<TaskId> {
        let id = self.shared.ids.generate_task_id();
        let now = self.shared.clock.now();
        let kind = spec.kind();
        let mut buckets = self.shared.buckets();
        match buckets.admit(id, spec, now, self.shared.config.max_pending_tasks) {
            Ok(record) => {
                debug!(
                    task_id = %id,
                    ?kind,
                    priority = record.priority,
                    scheduled_time = %record.scheduled_time,
                    "task scheduled"
                );
                Ok(id)
            }
            Err(e) => {
                warn!(error = %e, "task rejected");
                Err(e)
            }
        }
    }

    /// Schedule a blocking function.
    pub fn schedule<F, T, E>(&self, f: F, options: TaskOptions) -> Result<TaskId>
    where
        F: Fn() -> std::result::Result<T, E> + Send + Sync + 'static,
        T: Serialize,
        E: fmt::Display,
    {
        self.submit(TaskSpec::with_options(Job::blocking(f), options))
    }

    /// Schedule an async function on the event loop.
    pub fn schedule_async<F, Fut, T, E>(&self, f: F, options: TaskOptions) -> Result<TaskId>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Serialize + 'static,
        E: fmt::Display + 'static,
    {
        self.submit(TaskSpec::with_options(Job::cooperative(f), options))
    }

    pub fn status(&self, id: TaskId) -> Result<TaskSnapshot> {
        self.shared
            .buckets()
            .find(id)
            .map(|record| record.snapshot())
            .ok_or(SchedulerError::TaskNotFound(id))
    }

    /// Cancel a pending task. Running tasks cannot be preempted.
    pub fn cancel(&self, id: TaskId) -> bool {
        let now = self.shared.clock.now();
        let outcome = self.shared.buckets().cancel(id, now);
        match outcome {
            CancelOutcome::Cancelled => {
                debug!(task_id = %id, "task cancelled");
                true
            }
            CancelOutcome::Running => {
                warn!(task_id = %id, "cannot cancel running task");
                false
            }
            CancelOutcome::NotPending => {
                warn!(task_id = %id, "task not found or already finished");
                false
            }
        }
    }

    pub fn list_pending(&self) -> Vec<TaskSnapshot> {
        self.shared.buckets().snapshots(Bucket::Pending)
    }

    pub fn list_running(&self) -> Vec<TaskSnapshot> {
        self.shared.buckets().snapshots(Bucket::Running)
    }

    /// Completed and cancelled tasks.
    pub fn list_completed(&self) -> Vec<TaskSnapshot> {
        self.shared.buckets().snapshots(Bucket::Completed)
    }

    pub fn list_failed(&self) -> Vec<TaskSnapshot> {
        self.shared.buckets().snapshots(Bucket::Failed)
    }

    /// Clear one bucket, or every non-running bucket with `None`.
    /// Running tasks are never cleared. Returns how many were removed.
    pub fn clear(&self, status: Option<TaskStatus>) -> usize {
        if status == Some(TaskStatus::Running) {
            warn!("running tasks cannot be cleared");
            return 0;
        }
        let removed = self.shared.buckets().clear(status);
        debug!(
            status = status.map(TaskStatus::as_str).unwrap_or("all"),
            removed,
            "cleared tasks"
        );
        removed
    }

    pub fn counts(&self) -> SchedulerCounts {
        self.shared.buckets().counts()
    }

    /// Wait until no task is running. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.wait_idle(timeout)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }
}

/// Outcome of [`Scheduler::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks still running when the grace period ran out. They stay in the
    /// running bucket; cooperative ones are dropped with the event loop.
    pub abandoned: Vec<TaskId>,
}

/// An in-process task scheduler.
///
/// Owns the periodic scheduling worker and both execution backends. Build
/// one with [`Scheduler::builder`], call [`Scheduler::start`], and pass
/// [`SchedulerHandle`]s to the code that submits work.
pub struct Scheduler {
    handle: SchedulerHandle,
    executors: Arc<Executors>,
    ticker: Mutex<Option<Ticker>>,
    shut_down: bool,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_parts(shared: Arc<Shared>, executors: Executors) -> Self {
        Self {
            handle: SchedulerHandle { shared },
            executors: Arc::new(executors),
            ticker: Mutex::new(None),
            shut_down: false,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Start the periodic scheduling worker. No-op if already running.
    pub fn start(&self) -> Result<()> {
        let mut ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if ticker.is_some() {
            warn!("task scheduler is already running");
            return Ok(());
        }
        *ticker = Some(Ticker::spawn(
            Arc::clone(&self.handle.shared),
            Arc::clone(&self.executors),
        ));
        info!(
            check_interval_secs = self.handle.shared.config.check_interval_secs,
            max_running_tasks = self.handle.shared.config.max_running_tasks,
            "task scheduler started"
        );
        Ok(())
    }

    /// Stop the scheduling worker. Tasks are kept; running ones finish.
    pub fn stop(&self) {
        let ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take();
        match ticker {
            Some(ticker) => {
                ticker.stop();
                info!("task scheduler stopped");
            }
            None => warn!("task scheduler is not running"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Run one scheduling cycle on the calling thread.
    pub fn tick(&self) -> TickReport {
        self.handle.shared.tick(&self.executors)
    }

    /// Stop ticking, wait up to the configured grace period for running
    /// tasks, then stop both backends.
    pub fn shutdown(mut self) -> ShutdownReport {
        let grace = self.handle.shared.shutdown_grace;
        self.shutdown_inner(grace)
    }

    fn shutdown_inner(&mut self, grace: Duration) -> ShutdownReport {
        if self.shut_down {
            return ShutdownReport::default();
        }
        self.shut_down = true;

        if let Some(ticker) = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            ticker.stop();
        }

        // wait at most `grace` for the running bucket to empty
        let drained = self.handle.wait_idle(grace);
        let abandoned = if drained {
            Vec::new()
        } else {
            self.handle.shared.running_ids()
        };

        self.executors.close();
        if drained {
            info!("task scheduler shut down");
        } else {
            warn!(
                abandoned = abandoned.len(),
                "task scheduler shut down with tasks still running"
            );
        }
        ShutdownReport { abandoned }
    }
}

impl Deref for Scheduler {
    type Target = SchedulerHandle;

    fn deref(&self) -> &SchedulerHandle {
        &self.handle
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown_inner(Duration::ZERO);
    }
}
