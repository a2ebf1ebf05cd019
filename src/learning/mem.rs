//! In-memory feedback store backed by DashMap.
//!
//! Used when the durable store cannot be opened, and in tests. All records are
//! lost on process exit.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::LearningResult;

use super::store::{FeedbackStore, UpdateFn};
use super::{Fingerprint, LearningRecord};

/// Concurrent in-memory store using a sharded hashmap.
///
/// A DashMap entry holds its shard's write lock, so same-key updates are
/// serialized.
#[derive(Debug, Default)]
pub struct MemFeedbackStore {
    data: DashMap<Fingerprint, LearningRecord>,
}

impl MemFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl FeedbackStore for MemFeedbackStore {
    fn update(&self, fingerprint: &Fingerprint, f: UpdateFn<'_>) -> LearningResult<LearningRecord> {
        let next = match self.data.entry(fingerprint.clone()) {
            Entry::Occupied(mut occupied) => {
                let next = f(Some(occupied.get().clone()));
                occupied.insert(next.clone());
                next
            }
            Entry::Vacant(vacant) => {
                let next = f(None);
                vacant.insert(next.clone());
                next
            }
        };
        Ok(next)
    }

    fn get(&self, fingerprint: &Fingerprint) -> LearningResult<Option<LearningRecord>> {
        Ok(self.data.get(fingerprint).map(|r| r.value().clone()))
    }

    fn scan(&self) -> LearningResult<Vec<LearningRecord>> {
        Ok(self.data.iter().map(|r| r.value().clone()).collect())
    }

    fn is_durable(&self) -> bool {
        false
    }
}
