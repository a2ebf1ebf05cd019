//! The learning memory facade: fingerprinting, feedback and weights over a
//! [`FeedbackStore`].

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{LearningError, LearningResult};

use super::store::FeedbackStore;
use super::{
    DurableFeedbackStore, FindingQuery, FindingStats, Fingerprint, LearningGuidance,
    LearningRecord, MemFeedbackStore, Outcome, WeightPolicy, classify, now_secs,
};

/// Feedback memory shared by every run in the process.
pub struct LearningMemory {
    store: Box<dyn FeedbackStore>,
    policy: WeightPolicy,
}

impl LearningMemory {
    /// Open the durable store at `path`, falling back to an in-memory store
    /// when it cannot be opened. The fallback is logged, never fatal.
    pub fn open(path: &Path, policy: WeightPolicy) -> Self {
        match DurableFeedbackStore::open(path) {
            Ok(store) => {
                info!(path = %path.display(), "opened durable learning store");
                Self::with_store(Box::new(store), policy)
            }
            Err(e) => {
                let unavailable = LearningError::Unavailable {
                    path: path.display().to_string(),
                    message: e.to_string(),
                };
                warn!(
                    error = %unavailable,
                    "learning store unavailable, using in-memory fallback"
                );
                Self::in_memory(policy)
            }
        }
    }

    /// An ephemeral memory.
    pub fn in_memory(policy: WeightPolicy) -> Self {
        Self::with_store(Box::new(MemFeedbackStore::new()), policy)
    }

    pub fn with_store(store: Box<dyn FeedbackStore>, policy: WeightPolicy) -> Self {
        Self { store, policy }
    }

    /// Whether feedback recorded now will be lost on restart.
    pub fn is_ephemeral(&self) -> bool {
        !self.store.is_durable()
    }

    pub fn policy(&self) -> &WeightPolicy {
        &self.policy
    }

    /// Register a finding, refreshing `last_seen` if it is already known.
    pub fn observe(&self, category: &str, description: &str) -> LearningResult<Fingerprint> {
        let fingerprint = Fingerprint::compute(category, description);
        let now = now_secs();
        self.store.update(&fingerprint, &mut |current| match current {
            Some(mut rec) => {
                rec.last_seen = rec.last_seen.max(now);
                if rec.description.is_empty() {
                    rec.category = category.to_string();
                    rec.description = description.to_string();
                }
                rec
            }
            None => LearningRecord::new(fingerprint.clone(), category, description, now),
        })?;
        Ok(fingerprint)
    }

    /// Count one label against a fingerprint, creating the record if needed.
    pub fn record_feedback(
        &self,
        fingerprint: &Fingerprint,
        outcome: Outcome,
    ) -> LearningResult<LearningRecord> {
        let now = now_secs();
        let record = self.store.update(fingerprint, &mut |current| {
            let mut rec = current
                .unwrap_or_else(|| LearningRecord::new(fingerprint.clone(), "", "", now));
            rec.apply(outcome, now);
            rec
        })?;
        debug!(%fingerprint, %outcome, "recorded feedback");
        Ok(record)
    }

    /// Weight multiplier for a fingerprint; 1.0 when it has never been seen.
    pub fn get_weight(&self, fingerprint: &Fingerprint) -> LearningResult<f64> {
        Ok(self
            .store
            .get(fingerprint)?
            .map_or(1.0, |rec| self.policy.weight(&rec)))
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> LearningResult<Option<LearningRecord>> {
        self.store.get(fingerprint)
    }

    /// Records whose description or category contains `keyword`,
    /// case-insensitively. Most recently seen first.
    pub fn search(&self, keyword: &str) -> LearningResult<Vec<LearningRecord>> {
        self.query(&FindingQuery::keyword(keyword))
    }

    /// Records matching every filter in `query`. Most recently seen first,
    /// ties by fingerprint.
    pub fn query(&self, query: &FindingQuery) -> LearningResult<Vec<LearningRecord>> {
        let mut hits: Vec<LearningRecord> = self
            .store
            .scan()?
            .into_iter()
            .filter(|rec| query.matches(rec))
            .collect();
        hits.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        Ok(hits)
    }

    /// Label counts over every finding, or only those in `category`.
    pub fn stats(&self, category: Option<&str>) -> LearningResult<FindingStats> {
        let query = FindingQuery {
            category: category.map(str::to_string),
            ..FindingQuery::default()
        };
        let records = self.store.scan()?;
        Ok(FindingStats::collect(records.iter().filter(|rec| query.matches(rec))))
    }

    /// Deprioritize and boost lists over all known findings.
    pub fn guidance(
        &self,
        min_rejected: u64,
        min_confirmed: u64,
    ) -> LearningResult<LearningGuidance> {
        let mut records = self.store.scan()?;
        records.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(classify(&records, min_rejected, min_confirmed))
    }
}

impl std::fmt::Debug for LearningMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningMemory")
            .field("ephemeral", &self.is_ephemeral())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_fingerprint_is_neutral() {
        let memory = LearningMemory::in_memory(WeightPolicy::default());
        let fp = Fingerprint::compute("style", "never observed");
        assert_eq!(memory.get_weight(&fp).unwrap(), 1.0);
        assert!(memory.is_ephemeral());
    }

    #[test]
    fn five_rejections_and_five_confirmations() {
        let memory = LearningMemory::in_memory(WeightPolicy::default());
        let bad = memory.observe("style", "trailing whitespace").unwrap();
        let good = memory.observe("security", "sql injection").unwrap();
        for _ in 0..5 {
            memory.record_feedback(&bad, Outcome::Rejected).unwrap();
            memory.record_feedback(&good, Outcome::Confirmed).unwrap();
        }
        let floor = memory.policy().floor;
        let ceiling = memory.policy().ceiling;
        let w_bad = memory.get_weight(&bad).unwrap();
        let w_good = memory.get_weight(&good).unwrap();
        assert!(w_bad < 1.0 && w_bad >= floor);
        assert!(w_good > 1.0 && w_good <= ceiling);
    }

    #[test]
    fn feedback_on_unknown_fingerprint_creates_record() {
        let memory = LearningMemory::in_memory(WeightPolicy::default());
        let fp = Fingerprint::from("deadbeef");
        let rec = memory.record_feedback(&fp, Outcome::Fixed).unwrap();
        assert_eq!(rec.fixed, 1);
        assert!(memory.get_weight(&fp).unwrap() > 1.0);
    }

    #[test]
    fn observe_is_idempotent_per_fingerprint() {
        let memory = LearningMemory::in_memory(WeightPolicy::default());
        let a = memory.observe("perf", "Loop allocates").unwrap();
        let b = memory.observe("perf", "loop   allocates").unwrap();
        assert_eq!(a, b);
        assert_eq!(memory.search("").unwrap().len(), 1);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let memory = LearningMemory::in_memory(WeightPolicy::default());
        memory.observe("security", "Unchecked unwrap in parser").unwrap();
        memory.observe("style", "long function").unwrap();
        let hits = memory.search("UNWRAP").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, "security");
        assert_eq!(memory.search("style").unwrap().len(), 1);
        assert!(memory.search("nothing-matches").unwrap().is_empty());
    }

    #[test]
    fn guidance_over_history() {
        let memory = LearningMemory::in_memory(WeightPolicy::default());
        let noisy = memory.observe("style", "magic number").unwrap();
        for _ in 0..3 {
            memory.record_feedback(&noisy, Outcome::Rejected).unwrap();
        }
        let guidance = memory.guidance(3, 3).unwrap();
        assert_eq!(guidance.deprioritize.len(), 1);
        assert_eq!(guidance.deprioritize[0].description, "magic number");
        assert!(guidance.boost.is_empty());
    }

    #[test]
    fn query_filters_by_category_and_outcome() {
        let memory = LearningMemory::in_memory(WeightPolicy::default());
        let leak = memory.observe("security", "token written to log").unwrap();
        let nit = memory.observe("style", "log message not capitalized").unwrap();
        memory.observe("security", "log file world readable").unwrap();
        memory.record_feedback(&leak, Outcome::Confirmed).unwrap();
        memory.record_feedback(&nit, Outcome::Rejected).unwrap();

        assert_eq!(memory.query(&FindingQuery::keyword("log")).unwrap().len(), 3);

        let security = FindingQuery::keyword("log").with_category("Security");
        assert_eq!(memory.query(&security).unwrap().len(), 2);

        let confirmed = memory
            .query(&security.clone().with_outcome(Outcome::Confirmed))
            .unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].fingerprint, leak);

        let rejected = memory
            .query(&FindingQuery::default().with_outcome(Outcome::Rejected))
            .unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].category, "style");
        assert!(memory.query(&security.with_outcome(Outcome::Rejected)).unwrap().is_empty());
    }

    #[test]
    fn stats_count_outcomes() {
        let memory = LearningMemory::in_memory(WeightPolicy::default());
        let a = memory.observe("security", "sql built by concatenation").unwrap();
        let b = memory.observe("style", "wildcard import").unwrap();
        memory.observe("style", "unused variable").unwrap();
        memory.record_feedback(&a, Outcome::Confirmed).unwrap();
        memory.record_feedback(&a, Outcome::Fixed).unwrap();
        memory.record_feedback(&b, Outcome::Rejected).unwrap();
        memory.record_feedback(&b, Outcome::Rejected).unwrap();
        memory.record_feedback(&b, Outcome::Ignored).unwrap();

        let stats = memory.stats(None).unwrap();
        assert_eq!(stats.findings, 3);
        assert_eq!(stats.unlabeled, 1);
        assert_eq!(stats.outcomes.rejected, 2);
        assert_eq!(stats.outcomes.confirmed, 1);
        assert_eq!(stats.outcomes.fixed, 1);
        assert_eq!(stats.outcomes.ignored, 1);
        assert_eq!(stats.outcomes.total(), 5);
        assert_eq!(stats.by_category["style"].rejected, 2);
        assert_eq!(stats.by_category["security"].total(), 2);

        let style = memory.stats(Some("style")).unwrap();
        assert_eq!(style.findings, 2);
        assert_eq!(style.outcomes.confirmed, 0);
        assert!(!style.by_category.contains_key("security"));
        assert!(style.summary().starts_with("2 finding(s), 1 unlabeled"));

        let empty = memory.stats(Some("perf")).unwrap();
        assert_eq!(empty, FindingStats::default());
    }
}
