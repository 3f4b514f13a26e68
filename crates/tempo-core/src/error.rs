use thiserror::Error;

use crate::domain::{JobKind, TaskId};

/// Errors surfaced synchronously to callers of the scheduler.
///
/// Faults raised by task bodies never show up here; they are captured as
/// [`TaskError`] and handled by the retry policy.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("maximum number of pending tasks reached (limit={limit})")]
    QueueFull { limit: usize },

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("invalid scheduler configuration: {0}")]
    Config(String),

    #[error("failed to read scheduler configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to start scheduler runtime: {0}")]
    Runtime(std::io::Error),

    #[error("executor is closed")]
    ExecutorClosed,

    #[error("executor cannot run {0:?} jobs")]
    UnsupportedJob(JobKind),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// A fault raised while executing a task body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
    message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Build an error out of a panic payload caught with `catch_unwind`.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = panic_message(payload.as_ref());
        Self::new(format!("task panicked: {detail}"))
    }
}

/// Text carried by a panic payload, if any.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_mentions_limit() {
        let err = SchedulerError::QueueFull { limit: 3 };
        assert!(err.to_string().contains("limit=3"));
    }

    #[test]
    fn panic_payloads_are_described() {
        let err = TaskError::from_panic(Box::new("boom"));
        assert_eq!(err.message(), "task panicked: boom");

        let err = TaskError::from_panic(Box::new(String::from("bang")));
        assert_eq!(err.message(), "task panicked: bang");

        let err = TaskError::from_panic(Box::new(7_u32));
        assert_eq!(err.message(), "task panicked: unknown panic payload");
    }
}
