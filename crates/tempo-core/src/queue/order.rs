//! Dispatch order among eligible tasks.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::TaskRecord;

/// How eligible tasks of equal priority are ordered for dispatch.
///
/// Priority always comes first (higher first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Earliest `scheduled_time` first, then submission order.
    #[default]
    Fifo,

    /// Latest `scheduled_time` first. Tasks that have waited longest can
    /// starve under a steady stream of equal-priority work.
    LatestFirst,
}

impl TieBreak {
    /// Ordering where `Less` means "dispatch first".
    pub fn compare(self, a: &TaskRecord, b: &TaskRecord) -> Ordering {
        let by_priority = b.priority.cmp(&a.priority);
        match self {
            TieBreak::Fifo => by_priority
                .then_with(|| a.scheduled_time.cmp(&b.scheduled_time))
                .then_with(|| a.seq.cmp(&b.seq)),
            TieBreak::LatestFirst => by_priority
                .then_with(|| b.scheduled_time.cmp(&a.scheduled_time))
                .then_with(|| b.seq.cmp(&a.seq)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, ScheduleAt, TaskId, TaskSpec};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use rstest::rstest;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn record(priority: i32, offset_secs: i64, seq: u64) -> TaskRecord {
        let spec = TaskSpec::new(Job::blocking(|| Ok::<_, String>(())))
            .priority(priority)
            .schedule(ScheduleAt::At(t0() + TimeDelta::seconds(offset_secs)));
        TaskRecord::new(TaskId::from_ulid(Ulid::new()), spec, seq, t0())
    }

    fn order(tie_break: TieBreak, mut records: Vec<TaskRecord>) -> Vec<u64> {
        records.sort_by(|a, b| tie_break.compare(a, b));
        records.iter().map(|r| r.seq).collect()
    }

    #[rstest]
    #[case::fifo(TieBreak::Fifo)]
    #[case::latest_first(TieBreak::LatestFirst)]
    fn priority_always_wins(#[case] tie_break: TieBreak) {
        let records = vec![record(1, 0, 0), record(10, 5, 1), record(5, 1, 2)];
        assert_eq!(order(tie_break, records), vec![1, 2, 0]);
    }

    #[test]
    fn fifo_prefers_longest_waiting() {
        let records = vec![record(5, 3, 0), record(5, 1, 1), record(5, 2, 2)];
        assert_eq!(order(TieBreak::Fifo, records), vec![1, 2, 0]);
    }

    #[test]
    fn fifo_uses_submission_order_for_equal_times() {
        let records = vec![record(5, 0, 2), record(5, 0, 0), record(5, 0, 1)];
        assert_eq!(order(TieBreak::Fifo, records), vec![0, 1, 2]);
    }

    #[test]
    fn latest_first_prefers_most_recently_scheduled() {
        let records = vec![record(5, 3, 0), record(5, 1, 1), record(5, 2, 2)];
        assert_eq!(order(TieBreak::LatestFirst, records), vec![0, 2, 1]);
    }

    #[test]
    fn deserializes_from_snake_case() {
        let t: TieBreak = serde_json::from_str("\"latest_first\"").unwrap();
        assert_eq!(t, TieBreak::LatestFirst);
    }
}
