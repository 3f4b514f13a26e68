//! The four task buckets and every mutation on them.
//!
//! Nothing here locks or blocks: the scheduler wraps `TaskBuckets` in its
//! single mutex and calls these methods while holding it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::record::FailureRoute;
use super::{TaskRecord, TaskSnapshot, TieBreak};
use crate::domain::{Job, JobResult, TaskId, TaskSpec, TaskStatus};
use crate::error::{Result, SchedulerError, TaskError};
use crate::observability::SchedulerCounts;

/// A task taken out of the pending list, ready to hand to an executor.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub id: TaskId,
    pub job: Job,
}

/// How a running task settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Completed,
    Retrying {
        retries: u32,
        max_retries: u32,
        next_at: DateTime<Utc>,
        error: TaskError,
    },
    Failed {
        retries: u32,
        error: TaskError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// Already dispatched; cannot be preempted.
    Running,
    /// Unknown id, or already terminal.
    NotPending,
}

/// Bucket selector for listing and clearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Pending list, running/completed/failed maps.
///
/// Invariant: a task id appears in at most one of the four at any instant.
#[derive(Debug, Default)]
pub struct TaskBuckets {
    pending: Vec<TaskRecord>,
    running: HashMap<TaskId, TaskRecord>,
    completed: HashMap<TaskId, TaskRecord>,
    failed: HashMap<TaskId, TaskRecord>,
    next_seq: u64,
}

impl TaskBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    /// Admission gate: reject once the pending list holds `max_pending` tasks.
    pub fn admit(
        &mut self,
        id: TaskId,
        spec: TaskSpec,
        now: DateTime<Utc>,
        max_pending: usize,
    ) -> Result<&TaskRecord> {
        if self.pending.len() >= max_pending {
            return Err(SchedulerError::QueueFull { limit: max_pending });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(TaskRecord::new(id, spec, seq, now));
        Ok(&self.pending[self.pending.len() - 1])
    }

    /// Move up to the free slot count of eligible tasks from pending to
    /// running, best first. This is the only Pending -> Running transition.
    pub fn take_eligible(
        &mut self,
        now: DateTime<Utc>,
        max_running: usize,
        tie_break: TieBreak,
    ) -> Vec<Dispatch> {
        let available_slots = max_running.saturating_sub(self.running.len());
        if available_slots == 0 {
            return Vec::new();
        }

        let mut eligible: Vec<&TaskRecord> =
            self.pending.iter().filter(|r| r.is_eligible(now)).collect();
        if eligible.is_empty() {
            return Vec::new();
        }
        eligible.sort_by(|a, b| tie_break.compare(a, b));
        let chosen: Vec<TaskId> = eligible
            .into_iter()
            .take(available_slots)
            .map(|r| r.id)
            .collect();

        let mut dispatches = Vec::with_capacity(chosen.len());
        for id in chosen {
            let Some(mut record) = self.remove_pending(id) else {
                continue;
            };
            record.mark_running(now);
            dispatches.push(Dispatch {
                id,
                job: record.job.clone(),
            });
            self.running.insert(id, record);
        }
        dispatches
    }

    /// Settle a running task with the outcome of its attempt.
    ///
    /// Returns `None` if the task is not in the running bucket.
    pub fn settle(&mut self, id: TaskId, outcome: JobResult, now: DateTime<Utc>) -> Option<Settled> {
        let mut record = self.running.remove(&id)?;
        let settled = match outcome {
            Ok(value) => {
                record.mark_completed(value, now);
                self.completed.insert(id, record);
                Settled::Completed
            }
            Err(error) => match record.record_failure(error.clone(), now) {
                FailureRoute::Retry => {
                    let settled = Settled::Retrying {
                        retries: record.retries,
                        max_retries: record.retry.max_retries,
                        next_at: record.scheduled_time,
                        error,
                    };
                    self.pending.push(record);
                    settled
                }
                FailureRoute::Failed => {
                    let settled = Settled::Failed {
                        retries: record.retries,
                        error,
                    };
                    self.failed.insert(id, record);
                    settled
                }
            },
        };
        Some(settled)
    }

    /// Cancel a pending task; it is filed in the completed bucket.
    pub fn cancel(&mut self, id: TaskId, now: DateTime<Utc>) -> CancelOutcome {
        if let Some(mut record) = self.remove_pending(id) {
            record.mark_cancelled(now);
            self.completed.insert(id, record);
            return CancelOutcome::Cancelled;
        }
        if self.running.contains_key(&id) {
            CancelOutcome::Running
        } else {
            CancelOutcome::NotPending
        }
    }

    /// Look a task up across running, completed, failed, then pending.
    pub fn find(&self, id: TaskId) -> Option<&TaskRecord> {
        self.running
            .get(&id)
            .or_else(|| self.completed.get(&id))
            .or_else(|| self.failed.get(&id))
            .or_else(|| self.pending.iter().find(|r| r.id == id))
    }

    /// Snapshots of one bucket. Pending keeps list order; the maps are
    /// ordered by submission.
    pub fn snapshots(&self, bucket: Bucket) -> Vec<TaskSnapshot> {
        let mut records: Vec<&TaskRecord> = match bucket {
            Bucket::Pending => return self.pending.iter().map(TaskRecord::snapshot).collect(),
            Bucket::Running => self.running.values().collect(),
            Bucket::Completed => self.completed.values().collect(),
            Bucket::Failed => self.failed.values().collect(),
        };
        records.sort_by_key(|r| r.seq);
        records.into_iter().map(TaskRecord::snapshot).collect()
    }

    pub fn running_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.running.keys().copied().collect();
        ids.sort();
        ids
    }

    /// History reaper: keep the `history_size` most recently ended records
    /// of each terminal bucket. Returns how many were evicted.
    pub fn reap(&mut self, history_size: usize) -> usize {
        trim_history(&mut self.completed, history_size) + trim_history(&mut self.failed, history_size)
    }

    /// Clear one non-running bucket, or all of them with `None`.
    ///
    /// `Some(Cancelled)` only drops cancelled records from the completed
    /// bucket; `Some(Running)` clears nothing. Returns how many were removed.
    pub fn clear(&mut self, status: Option<TaskStatus>) -> usize {
        let before = self.pending.len() + self.completed.len() + self.failed.len();
        match status {
            None => {
                self.pending.clear();
                self.completed.clear();
                self.failed.clear();
            }
            Some(TaskStatus::Pending) => self.pending.clear(),
            Some(TaskStatus::Completed) => self.completed.clear(),
            Some(TaskStatus::Failed) => self.failed.clear(),
            Some(TaskStatus::Cancelled) => {
                self.completed.retain(|_, r| r.status != TaskStatus::Cancelled)
            }
            Some(TaskStatus::Running) => {}
        }
        before - (self.pending.len() + self.completed.len() + self.failed.len())
    }

    pub fn counts(&self) -> SchedulerCounts {
        let cancelled = self
            .completed
            .values()
            .filter(|r| r.status == TaskStatus::Cancelled)
            .count();
        SchedulerCounts {
            pending: self.pending.len(),
            running: self.running.len(),
            completed: self.completed.len() - cancelled,
            cancelled,
            failed: self.failed.len(),
        }
    }

    fn remove_pending(&mut self, id: TaskId) -> Option<TaskRecord> {
        let index = self.pending.iter().position(|r| r.id == id)?;
        Some(self.pending.remove(index))
    }
}

fn trim_history(bucket: &mut HashMap<TaskId, TaskRecord>, history_size: usize) -> usize {
    if bucket.len() <= history_size {
        return 0;
    }
    let mut by_age: Vec<(Option<DateTime<Utc>>, u64, TaskId)> = bucket
        .values()
        .map(|r| (r.end_time, r.seq, r.id))
        .collect();
    // newest first; records without end_time sort last
    by_age.sort_by(|a, b| b.cmp(a));
    let evict: Vec<TaskId> = by_age
        .into_iter()
        .skip(history_size)
        .map(|(_, _, id)| id)
        .collect();
    for id in &evict {
        bucket.remove(id);
    }
    evict.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScheduleAt;
    use chrono::{TimeDelta, TimeZone};
    use std::time::Duration;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn ok_spec() -> TaskSpec {
        TaskSpec::new(Job::blocking(|| Ok::<_, String>(42)))
    }

    fn new_id() -> TaskId {
        TaskId::from_ulid(Ulid::new())
    }

    fn admit(buckets: &mut TaskBuckets, spec: TaskSpec) -> TaskId {
        let id = new_id();
        buckets.admit(id, spec, t0(), usize::MAX).unwrap();
        id
    }

    /// Every known id lives in exactly one bucket.
    fn assert_single_bucket(buckets: &TaskBuckets, ids: &[TaskId]) {
        for id in ids {
            let hits = buckets.pending.iter().filter(|r| r.id == *id).count()
                + usize::from(buckets.running.contains_key(id))
                + usize::from(buckets.completed.contains_key(id))
                + usize::from(buckets.failed.contains_key(id));
            assert!(hits <= 1, "{id} found in {hits} buckets");
        }
    }

    #[test]
    fn admission_bound_is_exact() {
        let mut buckets = TaskBuckets::new();
        for _ in 0..3 {
            buckets.admit(new_id(), ok_spec(), t0(), 3).unwrap();
        }
        let err = buckets.admit(new_id(), ok_spec(), t0(), 3).unwrap_err();
        assert!(matches!(err, SchedulerError::QueueFull { limit: 3 }));
        assert_eq!(buckets.pending_len(), 3);
    }

    #[test]
    fn only_due_tasks_are_dispatched() {
        let mut buckets = TaskBuckets::new();
        let due = admit(&mut buckets, ok_spec());
        let later = admit(
            &mut buckets,
            ok_spec().schedule(ScheduleAt::After(Duration::from_secs(100))),
        );

        let dispatched = buckets.take_eligible(t0(), 10, TieBreak::Fifo);
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].id, due);
        assert_eq!(buckets.find(due).unwrap().status, TaskStatus::Running);
        assert_eq!(buckets.find(later).unwrap().status, TaskStatus::Pending);

        let dispatched = buckets.take_eligible(t0() + TimeDelta::seconds(99), 10, TieBreak::Fifo);
        assert!(dispatched.is_empty());
        let dispatched = buckets.take_eligible(t0() + TimeDelta::seconds(100), 10, TieBreak::Fifo);
        assert_eq!(dispatched[0].id, later);
        assert_single_bucket(&buckets, &[due, later]);
    }

    #[test]
    fn dispatch_respects_free_slots_and_priority() {
        let mut buckets = TaskBuckets::new();
        let low = admit(&mut buckets, ok_spec().priority(1));
        let high = admit(&mut buckets, ok_spec().priority(10));
        let mid = admit(&mut buckets, ok_spec().priority(5));

        let first = buckets.take_eligible(t0(), 2, TieBreak::Fifo);
        let ids: Vec<TaskId> = first.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![high, mid]);

        // both slots taken
        assert!(buckets.take_eligible(t0(), 2, TieBreak::Fifo).is_empty());

        buckets.settle(high, Ok(serde_json::json!(1)), t0()).unwrap();
        let next = buckets.take_eligible(t0(), 2, TieBreak::Fifo);
        assert_eq!(next[0].id, low);
        assert_single_bucket(&buckets, &[low, high, mid]);
    }

    #[test]
    fn settle_routes_success_retry_and_failure() {
        let mut buckets = TaskBuckets::new();
        let id = admit(&mut buckets, ok_spec().max_retries(1));

        buckets.take_eligible(t0(), 1, TieBreak::Fifo);
        let settled = buckets.settle(id, Err(TaskError::new("e1")), t0()).unwrap();
        assert_eq!(
            settled,
            Settled::Retrying {
                retries: 1,
                max_retries: 1,
                next_at: t0() + TimeDelta::seconds(5),
                error: TaskError::new("e1"),
            }
        );
        assert_eq!(buckets.pending_len(), 1);
        assert_eq!(buckets.running_len(), 0);

        let at = t0() + TimeDelta::seconds(5);
        buckets.take_eligible(at, 1, TieBreak::Fifo);
        let settled = buckets.settle(id, Err(TaskError::new("e2")), at).unwrap();
        assert_eq!(
            settled,
            Settled::Failed {
                retries: 2,
                error: TaskError::new("e2"),
            }
        );
        assert_eq!(buckets.find(id).unwrap().status, TaskStatus::Failed);
        assert!(buckets.settle(id, Ok(serde_json::json!(0)), at).is_none());
        assert_single_bucket(&buckets, &[id]);
    }

    #[test]
    fn cancel_only_pending() {
        let mut buckets = TaskBuckets::new();
        let pending = admit(&mut buckets, ok_spec().schedule(ScheduleAt::Seconds(60.0)));
        let running = admit(&mut buckets, ok_spec());
        buckets.take_eligible(t0(), 10, TieBreak::Fifo);

        assert_eq!(buckets.cancel(pending, t0()), CancelOutcome::Cancelled);
        assert_eq!(buckets.find(pending).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(buckets.cancel(pending, t0()), CancelOutcome::NotPending);
        assert_eq!(buckets.cancel(running, t0()), CancelOutcome::Running);
        assert_eq!(buckets.cancel(new_id(), t0()), CancelOutcome::NotPending);

        let counts = buckets.counts();
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.completed, 0);
        assert_eq!(counts.running, 1);
    }

    #[test]
    fn reaper_keeps_most_recent() {
        let history_size = 10;
        let mut buckets = TaskBuckets::new();
        let mut ids = Vec::new();
        for i in 0..(history_size + 5) {
            let id = admit(&mut buckets, ok_spec());
            buckets.take_eligible(t0(), 1, TieBreak::Fifo);
            buckets
                .settle(id, Ok(serde_json::json!(i)), t0() + TimeDelta::seconds(i as i64))
                .unwrap();
            ids.push(id);
        }

        assert_eq!(buckets.reap(history_size), 5);
        let kept = buckets.snapshots(Bucket::Completed);
        assert_eq!(kept.len(), history_size);
        for evicted in &ids[..5] {
            assert!(buckets.find(*evicted).is_none());
        }
        for recent in &ids[5..] {
            assert!(buckets.find(*recent).is_some());
        }
        assert_eq!(buckets.reap(history_size), 0);
    }

    #[test]
    fn reaper_trims_failed_bucket_independently() {
        let history_size = 4;
        let mut buckets = TaskBuckets::new();

        let done = admit(&mut buckets, ok_spec());
        buckets.take_eligible(t0(), 1, TieBreak::Fifo);
        buckets.settle(done, Ok(serde_json::json!(1)), t0()).unwrap();

        let mut ids = Vec::new();
        for i in 0..(history_size + 5) {
            let id = admit(&mut buckets, ok_spec().max_retries(0));
            buckets.take_eligible(t0(), 1, TieBreak::Fifo);
            let settled = buckets
                .settle(id, Err(TaskError::new("boom")), t0() + TimeDelta::seconds(i as i64))
                .unwrap();
            assert!(matches!(settled, Settled::Failed { .. }));
            ids.push(id);
        }

        assert_eq!(buckets.reap(history_size), 5);
        assert_eq!(buckets.snapshots(Bucket::Failed).len(), history_size);
        for evicted in &ids[..5] {
            assert!(buckets.find(*evicted).is_none());
        }
        for recent in &ids[5..] {
            assert_eq!(buckets.find(*recent).unwrap().status, TaskStatus::Failed);
        }
        assert!(buckets.find(done).is_some());
        assert_eq!(buckets.snapshots(Bucket::Completed).len(), 1);
    }

    #[test]
    fn reaper_never_touches_pending_or_running() {
        let mut buckets = TaskBuckets::new();
        for _ in 0..5 {
            admit(&mut buckets, ok_spec());
        }
        buckets.take_eligible(t0(), 2, TieBreak::Fifo);
        assert_eq!(buckets.reap(0), 0);
        assert_eq!(buckets.pending_len(), 3);
        assert_eq!(buckets.running_len(), 2);
    }

    #[test]
    fn clear_leaves_running_alone() {
        let mut buckets = TaskBuckets::new();
        let done = admit(&mut buckets, ok_spec());
        buckets.take_eligible(t0(), 1, TieBreak::Fifo);
        buckets.settle(done, Ok(serde_json::json!(1)), t0()).unwrap();
        let running = admit(&mut buckets, ok_spec());
        buckets.take_eligible(t0(), 1, TieBreak::Fifo);
        let cancelled = admit(&mut buckets, ok_spec());
        buckets.cancel(cancelled, t0());
        admit(&mut buckets, ok_spec());

        assert_eq!(buckets.clear(Some(TaskStatus::Running)), 0);
        assert_eq!(buckets.clear(Some(TaskStatus::Cancelled)), 1);
        assert!(buckets.find(done).is_some());
        assert_eq!(buckets.clear(None), 2);
        assert!(buckets.find(running).is_some());
        assert_eq!(buckets.counts().total(), 1);
    }

    #[test]
    fn lookup_order_prefers_running() {
        let mut buckets = TaskBuckets::new();
        let id = admit(&mut buckets, ok_spec());
        assert_eq!(buckets.find(id).unwrap().status, TaskStatus::Pending);
        buckets.take_eligible(t0(), 1, TieBreak::Fifo);
        assert_eq!(buckets.find(id).unwrap().status, TaskStatus::Running);
        assert_eq!(buckets.running_ids(), vec![id]);
    }
}
