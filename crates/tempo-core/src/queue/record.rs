//! Task record: identity, payload and lifecycle state of one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::retry::{RetryDecision, RetryPolicy};
use crate::domain::spec::add_delay;
use crate::domain::{Job, JobKind, TaskId, TaskSpec, TaskStatus};
use crate::error::TaskError;

/// A task held by the scheduler.
///
/// Design:
/// - Lives in exactly one bucket (pending/running/completed/failed) at a time.
/// - All status changes go through the methods below.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub job: Job,
    pub priority: i32,
    pub scheduled_time: DateTime<Utc>,
    pub retry: RetryPolicy,
    pub description: Option<String>,

    /// Submission order; breaks ties between otherwise equal tasks.
    pub seq: u64,

    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    /// Failures so far.
    pub retries: u32,
    pub result: Option<serde_json::Value>,

    /// Last failure detail.
    pub error: Option<TaskError>,
}

/// Where a record goes after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureRoute {
    Retry,
    Failed,
}

impl TaskRecord {
    pub fn new(id: TaskId, spec: TaskSpec, seq: u64, now: DateTime<Utc>) -> Self {
        let TaskSpec { job, options } = spec;
        Self {
            id,
            job,
            priority: options.priority,
            scheduled_time: options.schedule.resolve(now),
            retry: options.retry,
            description: options.description,
            seq,
            status: TaskStatus::Pending,
            created_at: now,
            start_time: None,
            end_time: None,
            retries: 0,
            result: None,
            error: None,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.job.kind()
    }

    /// Eligible = pending and its scheduled time has arrived.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.scheduled_time <= now
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.start_time = Some(now);
    }

    pub fn mark_completed(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.end_time = Some(now);
    }

    /// Record a failed attempt and apply the retry policy.
    ///
    /// On retry the record is back to Pending with a backoff `scheduled_time`;
    /// otherwise it is Failed and terminal.
    pub fn record_failure(&mut self, error: TaskError, now: DateTime<Utc>) -> FailureRoute {
        self.retries += 1;
        self.error = Some(error);
        match self.retry.decide(self.retries) {
            RetryDecision::RetryAfter(delay) => {
                self.scheduled_time = add_delay(now, delay);
                self.status = TaskStatus::Pending;
                FailureRoute::Retry
            }
            RetryDecision::GiveUp => {
                self.status = TaskStatus::Failed;
                self.end_time = Some(now);
                FailureRoute::Failed
            }
        }
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Cancelled;
        self.end_time = Some(now);
    }

    /// Point-in-time view for callers.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            status: self.status,
            description: self.description.clone(),
            priority: self.priority,
            scheduled_time: self.scheduled_time,
            created_at: self.created_at,
            start_time: self.start_time,
            end_time: self.end_time,
            retries: self.retries,
            max_retries: self.retry.max_retries,
            is_async: self.kind() == JobKind::Cooperative,
            result: self.result.clone(),
            error: self.error.as_ref().map(|e| e.message().to_string()),
        }
    }
}

/// Serializable status of a task, as returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub status: TaskStatus,
    pub description: Option<String>,
    pub priority: i32,
    pub scheduled_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub retries: u32,
    pub max_retries: u32,
    pub is_async: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
