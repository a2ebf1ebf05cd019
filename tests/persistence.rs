//! Persistence and recovery tests for the learning store.
//!
//! These tests verify that feedback survives a reopen, that an unusable store
//! location degrades to memory instead of failing, and that concurrent
//! updates against the durable store are never lost.

use std::sync::Arc;
use std::thread;

use conduit::learning::{Fingerprint, LearningMemory, Outcome, WeightPolicy};

#[test]
fn feedback_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested/learning.redb");

    let fp = {
        let memory = LearningMemory::open(&path, WeightPolicy::default());
        assert!(!memory.is_ephemeral());
        let fp = memory.observe("style", "line exceeds 120 characters").unwrap();
        memory.record_feedback(&fp, Outcome::Rejected).unwrap();
        memory.record_feedback(&fp, Outcome::Rejected).unwrap();
        memory.record_feedback(&fp, Outcome::Accepted).unwrap();
        fp
    };

    let memory = LearningMemory::open(&path, WeightPolicy::default());
    let record = memory.get(&fp).unwrap().unwrap();
    assert_eq!(record.rejected, 2);
    assert_eq!(record.accepted, 1);
    assert_eq!(record.category, "style");
    assert!((memory.get_weight(&fp).unwrap() - 0.8).abs() < 1e-9);

    let hits = memory.search("120 CHARACTERS").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].fingerprint, fp);
}

#[test]
fn fingerprint_is_stable_across_sessions() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("learning.redb");

    let first = LearningMemory::open(&path, WeightPolicy::default())
        .observe("security", "Hard-coded   secret")
        .unwrap();
    let second = LearningMemory::open(&path, WeightPolicy::default())
        .observe(" security ", "hard-coded secret")
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first, Fingerprint::compute("security", "hard-coded secret"));
}

#[test]
fn unusable_location_falls_back_to_memory() {
    let dir = tempfile::TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "plain file").unwrap();

    let memory = LearningMemory::open(&blocker.join("learning.redb"), WeightPolicy::default());
    assert!(memory.is_ephemeral());

    let fp = memory.observe("style", "nit").unwrap();
    memory.record_feedback(&fp, Outcome::Confirmed).unwrap();
    assert!(memory.get_weight(&fp).unwrap() > 1.0);
}

#[test]
fn concurrent_durable_updates_are_not_lost() {
    let dir = tempfile::TempDir::new().unwrap();
    let memory = Arc::new(LearningMemory::open(
        &dir.path().join("learning.redb"),
        WeightPolicy::default(),
    ));
    let fp = memory.observe("perf", "allocation in hot loop").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let memory = Arc::clone(&memory);
            let fp = fp.clone();
            thread::spawn(move || {
                let outcome = if i % 2 == 0 { Outcome::Accepted } else { Outcome::Rejected };
                for _ in 0..25 {
                    memory.record_feedback(&fp, outcome).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let record = memory.get(&fp).unwrap().unwrap();
    assert_eq!(record.accepted, 50);
    assert_eq!(record.rejected, 50);
    assert_eq!(record.total_feedback(), 100);
}

#[test]
fn guidance_reflects_persisted_history() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("learning.redb");
    {
        let memory = LearningMemory::open(&path, WeightPolicy::default());
        let noisy = memory.observe("style", "prefer early return").unwrap();
        let real = memory.observe("security", "unchecked path join").unwrap();
        for _ in 0..3 {
            memory.record_feedback(&noisy, Outcome::Rejected).unwrap();
        }
        memory.record_feedback(&real, Outcome::Confirmed).unwrap();
        memory.record_feedback(&real, Outcome::Fixed).unwrap();
    }

    let guidance = LearningMemory::open(&path, WeightPolicy::default())
        .guidance(2, 2)
        .unwrap();
    assert_eq!(guidance.deprioritize.len(), 1);
    assert_eq!(guidance.deprioritize[0].category, "style");
    assert_eq!(guidance.boost.len(), 1);
    assert_eq!(guidance.boost[0].category, "security");
}
