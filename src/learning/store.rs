//! Storage interface for learning records.

use crate::error::LearningResult;

use super::{Fingerprint, LearningRecord};

/// Read-modify-write function applied by [`FeedbackStore::update`].
///
/// Receives the current record (if any) and returns the record to store.
pub type UpdateFn<'a> = &'a mut dyn FnMut(Option<LearningRecord>) -> LearningRecord;

/// Keyed storage for [`LearningRecord`]s.
///
/// Implementations must make `update` atomic per key: two concurrent updates
/// to the same fingerprint both land.
pub trait FeedbackStore: Send + Sync {
    /// Atomically replace the record for `fingerprint` with `f(current)`.
    fn update(&self, fingerprint: &Fingerprint, f: UpdateFn<'_>) -> LearningResult<LearningRecord>;

    /// Read the last committed record for `fingerprint`.
    fn get(&self, fingerprint: &Fingerprint) -> LearningResult<Option<LearningRecord>>;

    /// All records, in no particular order.
    fn scan(&self) -> LearningResult<Vec<LearningRecord>>;

    /// Whether records survive a process restart.
    fn is_durable(&self) -> bool;
}
