//! Queue module: task records, the four state buckets, dispatch order and
//! retry policy.

mod buckets;
mod order;
mod record;
mod retry;

pub use buckets::{Bucket, CancelOutcome, Dispatch, Settled, TaskBuckets};
pub use order::TieBreak;
pub use record::{FailureRoute, TaskRecord, TaskSnapshot};
pub use retry::{RetryDecision, RetryPolicy};
