//! Continuous learning: feedback counters keyed by finding fingerprint.
//!
//! Every surfaced finding is fingerprinted from its category and normalized
//! description. Reviewers label findings (accepted, rejected, ...) and the
//! counters feed a bounded weight multiplier that later runs use to re-rank
//! similar findings.
//!
//! Storage is pluggable through [`FeedbackStore`]: [`DurableFeedbackStore`]
//! (redb) when the configured path is usable, [`MemFeedbackStore`] (DashMap)
//! otherwise. [`LearningMemory`] picks one at open time.

pub mod durable;
pub mod mem;
pub mod memory;
pub mod store;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

pub use durable::DurableFeedbackStore;
pub use mem::MemFeedbackStore;
pub use memory::LearningMemory;
pub use store::FeedbackStore;

/// A reviewer's verdict on a surfaced finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Accepted,
    Rejected,
    Confirmed,
    Fixed,
    Ignored,
}

impl Outcome {
    pub const ALL: [Outcome; 5] = [
        Outcome::Accepted,
        Outcome::Rejected,
        Outcome::Confirmed,
        Outcome::Fixed,
        Outcome::Ignored,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::Rejected => "rejected",
            Outcome::Confirmed => "confirmed",
            Outcome::Fixed => "fixed",
            Outcome::Ignored => "ignored",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Outcome::ALL
            .into_iter()
            .find(|o| o.as_str() == lower)
            .ok_or_else(|| {
                format!("unknown outcome \"{s}\" (expected accepted, rejected, confirmed, fixed or ignored)")
            })
    }
}

/// Stable identity of a finding: hex SHA-256 over category and normalized
/// description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a finding. Descriptions that differ only in case,
    /// whitespace or Unicode compatibility forms share a fingerprint.
    pub fn compute(category: &str, description: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(category.trim().as_bytes());
        hasher.update("\u{1f}".as_bytes());
        hasher.update(normalize_description(description).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// NFKC, lower-case, whitespace collapsed to single spaces.
fn normalize_description(description: &str) -> String {
    let folded: String = description.nfkc().collect::<String>().to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Persisted feedback counters for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub fingerprint: Fingerprint,
    pub category: String,
    pub description: String,
    pub accepted: u64,
    pub rejected: u64,
    pub confirmed: u64,
    pub fixed: u64,
    pub ignored: u64,
    /// Unix seconds.
    pub first_seen: u64,
    /// Unix seconds.
    pub last_seen: u64,
}

impl LearningRecord {
    pub fn new(
        fingerprint: Fingerprint,
        category: impl Into<String>,
        description: impl Into<String>,
        now: u64,
    ) -> Self {
        Self {
            fingerprint,
            category: category.into(),
            description: description.into(),
            accepted: 0,
            rejected: 0,
            confirmed: 0,
            fixed: 0,
            ignored: 0,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Increment the counter for `outcome`.
    pub fn apply(&mut self, outcome: Outcome, now: u64) {
        match outcome {
            Outcome::Accepted => self.accepted += 1,
            Outcome::Rejected => self.rejected += 1,
            Outcome::Confirmed => self.confirmed += 1,
            Outcome::Fixed => self.fixed += 1,
            Outcome::Ignored => self.ignored += 1,
        }
        self.last_seen = self.last_seen.max(now);
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Accepted => self.accepted,
            Outcome::Rejected => self.rejected,
            Outcome::Confirmed => self.confirmed,
            Outcome::Fixed => self.fixed,
            Outcome::Ignored => self.ignored,
        }
    }

    /// Accepted, confirmed and fixed labels.
    pub fn positive(&self) -> u64 {
        self.accepted + self.confirmed + self.fixed
    }

    /// All labels, ignored included.
    pub fn total_feedback(&self) -> u64 {
        Outcome::ALL.into_iter().map(|o| self.count(o)).sum()
    }

    /// Bounded weight multiplier derived from the counters.
    pub fn weight(&self, policy: &WeightPolicy) -> f64 {
        policy.weight(self)
    }
}

/// Constants for turning feedback counts into a weight multiplier.
///
/// `weight = clamp(1 + Σ step(outcome) · count(outcome), floor, ceiling)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightPolicy {
    pub floor: f64,
    pub ceiling: f64,
    pub accepted_step: f64,
    pub confirmed_step: f64,
    pub fixed_step: f64,
    /// Subtracted per rejection.
    pub rejected_step: f64,
}

impl Default for WeightPolicy {
    fn default() -> Self {
        Self {
            floor: 0.25,
            ceiling: 2.0,
            accepted_step: 0.10,
            confirmed_step: 0.15,
            fixed_step: 0.10,
            rejected_step: 0.15,
        }
    }
}

impl WeightPolicy {
    /// Weight of a record; 1.0 is neutral.
    pub fn weight(&self, record: &LearningRecord) -> f64 {
        let raw = 1.0 + self.accepted_step * record.accepted as f64
            + self.confirmed_step * record.confirmed as f64
            + self.fixed_step * record.fixed as f64
            - self.rejected_step * record.rejected as f64;
        raw.clamp(self.floor, self.ceiling)
    }

    /// Check that the bounds bracket the neutral weight and that every step
    /// is a non-negative magnitude, so the weight is monotonic in its counts.
    pub fn validate(&self) -> Result<(), String> {
        let finite = [
            self.floor,
            self.ceiling,
            self.accepted_step,
            self.confirmed_step,
            self.fixed_step,
            self.rejected_step,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err("weight policy values must be finite".into());
        }
        if !(self.floor > 0.0 && self.floor <= 1.0 && self.ceiling >= 1.0) {
            return Err(format!(
                "weight policy needs 0 < floor <= 1 <= ceiling (got floor {}, ceiling {})",
                self.floor, self.ceiling
            ));
        }
        let steps = [
            ("accepted_step", self.accepted_step),
            ("confirmed_step", self.confirmed_step),
            ("fixed_step", self.fixed_step),
            ("rejected_step", self.rejected_step),
        ];
        if let Some((name, value)) = steps.iter().find(|(_, v)| *v < 0.0) {
            return Err(format!("weight policy `{name}` must not be negative (got {value})"));
        }
        Ok(())
    }
}

/// A finding singled out by [`LearningMemory::guidance`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuidanceEntry {
    pub fingerprint: Fingerprint,
    pub category: String,
    pub description: String,
    pub reason: String,
}

/// Findings to push down or pull up in the current run, derived from history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearningGuidance {
    /// Historically rejected findings (likely false positives).
    pub deprioritize: Vec<GuidanceEntry>,
    /// Historically accepted, confirmed or fixed findings.
    pub boost: Vec<GuidanceEntry>,
}

impl LearningGuidance {
    pub fn is_empty(&self) -> bool {
        self.deprioritize.is_empty() && self.boost.is_empty()
    }

    /// One-line summary for reports.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.deprioritize.is_empty() {
            parts.push(format!(
                "{} pattern(s) deprioritized as likely false positives",
                self.deprioritize.len()
            ));
        }
        if !self.boost.is_empty() {
            parts.push(format!(
                "{} pattern(s) boosted as historically important",
                self.boost.len()
            ));
        }
        if parts.is_empty() {
            "no historical guidance".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Filters for [`LearningMemory::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindingQuery {
    /// Case-insensitive substring of the description or category.
    pub keyword: String,
    /// Exact category, compared trimmed and case-insensitively.
    pub category: Option<String>,
    /// Only findings labelled with this outcome at least once.
    pub outcome: Option<Outcome>,
}

impl FindingQuery {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn matches(&self, rec: &LearningRecord) -> bool {
        let needle = self.keyword.trim().to_lowercase();
        let keyword_ok = needle.is_empty()
            || rec.description.to_lowercase().contains(&needle)
            || rec.category.to_lowercase().contains(&needle);
        let category_ok = self
            .category
            .as_deref()
            .is_none_or(|c| c.trim().eq_ignore_ascii_case(rec.category.trim()));
        let outcome_ok = self.outcome.is_none_or(|o| rec.count(o) > 0);
        keyword_ok && category_ok && outcome_ok
    }
}

/// Label counts summed over a set of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub accepted: u64,
    pub rejected: u64,
    pub confirmed: u64,
    pub fixed: u64,
    pub ignored: u64,
}

impl OutcomeCounts {
    fn add(&mut self, rec: &LearningRecord) {
        self.accepted += rec.accepted;
        self.rejected += rec.rejected;
        self.confirmed += rec.confirmed;
        self.fixed += rec.fixed;
        self.ignored += rec.ignored;
    }

    pub fn get(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Accepted => self.accepted,
            Outcome::Rejected => self.rejected,
            Outcome::Confirmed => self.confirmed,
            Outcome::Fixed => self.fixed,
            Outcome::Ignored => self.ignored,
        }
    }

    pub fn total(&self) -> u64 {
        Outcome::ALL.into_iter().map(|o| self.get(o)).sum()
    }
}

/// Aggregate feedback over known findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FindingStats {
    /// Findings counted.
    pub findings: u64,
    /// Findings with no label yet.
    pub unlabeled: u64,
    pub outcomes: OutcomeCounts,
    pub by_category: BTreeMap<String, OutcomeCounts>,
}

impl FindingStats {
    pub(crate) fn collect<'a>(records: impl IntoIterator<Item = &'a LearningRecord>) -> Self {
        let mut stats = Self::default();
        for rec in records {
            stats.findings += 1;
            if rec.total_feedback() == 0 {
                stats.unlabeled += 1;
            }
            stats.outcomes.add(rec);
            stats
                .by_category
                .entry(rec.category.clone())
                .or_default()
                .add(rec);
        }
        stats
    }

    pub fn summary(&self) -> String {
        let labels: Vec<String> = Outcome::ALL
            .into_iter()
            .map(|o| format!("{o} {}", self.outcomes.get(o)))
            .collect();
        format!(
            "{} finding(s), {} unlabeled; {}",
            self.findings,
            self.unlabeled,
            labels.join(", ")
        )
    }
}

/// Minimum labels before a ratio alone can classify a finding.
const RATIO_MIN_FEEDBACK: u64 = 2;
/// Share of labels that must agree for the ratio rule.
const RATIO_THRESHOLD: f64 = 0.7;

/// Sort records into deprioritize and boost lists.
///
/// A record is deprioritized when it was rejected at least `min_rejected`
/// times, or when at least 70% of two or more labels were rejections.
/// Boosting mirrors this with positive labels and `min_confirmed`.
pub(crate) fn classify(
    records: &[LearningRecord],
    min_rejected: u64,
    min_confirmed: u64,
) -> LearningGuidance {
    let mut guidance = LearningGuidance::default();
    for rec in records {
        let total = rec.total_feedback();
        if total == 0 {
            continue;
        }
        let ratio_applies = total >= RATIO_MIN_FEEDBACK;
        let rejected_ratio = rec.rejected as f64 / total as f64;
        let positive_ratio = rec.positive() as f64 / total as f64;

        let entry = |reason: String| GuidanceEntry {
            fingerprint: rec.fingerprint.clone(),
            category: rec.category.clone(),
            description: rec.description.clone(),
            reason,
        };

        if rec.rejected >= min_rejected.max(1) {
            guidance
                .deprioritize
                .push(entry(format!("historically rejected {} time(s)", rec.rejected)));
        } else if ratio_applies && rejected_ratio >= RATIO_THRESHOLD {
            guidance
                .deprioritize
                .push(entry(format!("rejected {}/{total} times", rec.rejected)));
        }

        if rec.positive() >= min_confirmed.max(1) {
            guidance
                .boost
                .push(entry(format!("confirmed important {} time(s)", rec.positive())));
        } else if ratio_applies && positive_ratio >= RATIO_THRESHOLD {
            guidance
                .boost
                .push(entry(format!("confirmed {}/{total} times", rec.positive())));
        }
    }
    guidance
}

/// Current unix time in seconds.
pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(outcome: Outcome, n: u64) -> LearningRecord {
        let mut rec = LearningRecord::new(Fingerprint::compute("style", "x"), "style", "x", 1);
        for _ in 0..n {
            rec.apply(outcome, 2);
        }
        rec
    }

    #[test]
    fn fingerprint_normalizes_description() {
        let a = Fingerprint::compute("security", "Unchecked  input in\tHandler");
        let b = Fingerprint::compute("security", "unchecked input in handler");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        let c = Fingerprint::compute("style", "unchecked input in handler");
        assert_ne!(a, c);
    }

    #[test]
    fn outcome_parses_case_insensitively() {
        assert_eq!("Rejected".parse::<Outcome>().unwrap(), Outcome::Rejected);
        assert_eq!(" fixed ".parse::<Outcome>().unwrap(), Outcome::Fixed);
        assert!("pending".parse::<Outcome>().is_err());
    }

    #[test]
    fn rejections_lower_weight_within_floor() {
        let policy = WeightPolicy::default();
        let w = record_with(Outcome::Rejected, 5).weight(&policy);
        assert!(w < 1.0);
        assert!(w >= policy.floor);
        let w = record_with(Outcome::Rejected, 100).weight(&policy);
        assert_eq!(w, policy.floor);
    }

    #[test]
    fn confirmations_raise_weight_within_ceiling() {
        let policy = WeightPolicy::default();
        let w = record_with(Outcome::Confirmed, 5).weight(&policy);
        assert!(w > 1.0);
        assert!(w <= policy.ceiling);
        let w = record_with(Outcome::Confirmed, 100).weight(&policy);
        assert_eq!(w, policy.ceiling);
    }

    #[test]
    fn ignored_is_weight_neutral() {
        let policy = WeightPolicy::default();
        let rec = record_with(Outcome::Ignored, 7);
        assert_eq!(rec.weight(&policy), 1.0);
        assert_eq!(rec.ignored, 7);
        assert_eq!(rec.total_feedback(), 7);
    }

    #[test]
    fn policy_validation() {
        assert!(WeightPolicy::default().validate().is_ok());
        let bad = WeightPolicy {
            floor: 1.5,
            ..WeightPolicy::default()
        };
        assert!(bad.validate().is_err());
        let inverted = WeightPolicy {
            accepted_step: -0.5,
            ..WeightPolicy::default()
        };
        assert!(inverted.validate().unwrap_err().contains("accepted_step"));
        let flat = WeightPolicy {
            rejected_step: 0.0,
            ..WeightPolicy::default()
        };
        assert!(flat.validate().is_ok());
    }

    #[test]
    fn classify_by_threshold_and_ratio() {
        let mut noisy = record_with(Outcome::Rejected, 3);
        noisy.apply(Outcome::Accepted, 3);
        let mut mostly_good = record_with(Outcome::Fixed, 3);
        mostly_good.apply(Outcome::Ignored, 3);
        let single = record_with(Outcome::Rejected, 1);

        let guidance = classify(&[noisy, mostly_good, single], 5, 5);
        // 3 of 4 labels rejected passes the ratio rule.
        assert_eq!(guidance.deprioritize.len(), 1);
        assert!(guidance.deprioritize[0].reason.contains("3/4"));
        // 3 of 4 labels positive.
        assert_eq!(guidance.boost.len(), 1);
        assert!(guidance.summary().contains("1 pattern(s) boosted"));
    }

    #[test]
    fn classify_by_absolute_count() {
        let guidance = classify(&[record_with(Outcome::Rejected, 1)], 1, 2);
        assert_eq!(guidance.deprioritize.len(), 1);
        assert!(guidance.boost.is_empty());
    }
}
