//! ACID-durable feedback store backed by redb.
//!
//! One table, `findings`, maps fingerprint strings to bincode-encoded
//! [`LearningRecord`]s. redb admits a single write transaction at a time, which
//! makes every read-modify-write in [`FeedbackStore::update`] atomic.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{LearningError, LearningResult};

use super::store::{FeedbackStore, UpdateFn};
use super::{Fingerprint, LearningRecord};

/// Fingerprint → bincode(LearningRecord).
const FINDINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("findings");

fn redb_err<E: std::fmt::Display>(context: &str) -> impl Fn(E) -> LearningError + '_ {
    move |e| LearningError::Redb {
        message: format!("{context}: {e}"),
    }
}

/// Durable feedback store using redb.
pub struct DurableFeedbackStore {
    db: Database,
}

impl DurableFeedbackStore {
    /// Open or create the store file at `path`, creating parent directories.
    pub fn open(path: &Path) -> LearningResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LearningError::Io { source })?;
        }
        let db = Database::create(path).map_err(|e| LearningError::Redb {
            message: format!("failed to open redb at {}: {e}", path.display()),
        })?;

        // Create the table up front so read transactions never miss it.
        let txn = db
            .begin_write()
            .map_err(redb_err("begin_write failed"))?;
        txn.open_table(FINDINGS_TABLE)
            .map_err(redb_err("open_table failed"))?;
        txn.commit()
            .map_err(redb_err("commit failed"))?;

        Ok(Self { db })
    }
}

fn decode(bytes: &[u8]) -> LearningResult<LearningRecord> {
    bincode::deserialize(bytes).map_err(|e| LearningError::Serialization {
        message: format!("decode learning record: {e}"),
    })
}

fn encode(record: &LearningRecord) -> LearningResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| LearningError::Serialization {
        message: format!("encode learning record: {e}"),
    })
}

impl FeedbackStore for DurableFeedbackStore {
    fn update(&self, fingerprint: &Fingerprint, f: UpdateFn<'_>) -> LearningResult<LearningRecord> {
        let txn = self
            .db
            .begin_write()
            .map_err(redb_err("begin_write failed"))?;
        let next = {
            let mut table = txn
                .open_table(FINDINGS_TABLE)
                .map_err(redb_err("open_table failed"))?;
            let current = table
                .get(fingerprint.as_str())
                .map_err(redb_err("get failed"))?
                .map(|guard| guard.value().to_vec());
            let current = current.as_deref().map(decode).transpose()?;
            let next = f(current);
            let bytes = encode(&next)?;
            table
                .insert(fingerprint.as_str(), bytes.as_slice())
                .map_err(redb_err("insert failed"))?;
            next
        };
        txn.commit()
            .map_err(redb_err("commit failed"))?;
        Ok(next)
    }

    fn get(&self, fingerprint: &Fingerprint) -> LearningResult<Option<LearningRecord>> {
        let txn = self
            .db
            .begin_read()
            .map_err(redb_err("begin_read failed"))?;
        let table = txn
            .open_table(FINDINGS_TABLE)
            .map_err(redb_err("open_table failed"))?;
        let bytes = table
            .get(fingerprint.as_str())
            .map_err(redb_err("get failed"))?
            .map(|guard| guard.value().to_vec());
        bytes.as_deref().map(decode).transpose()
    }

    fn scan(&self) -> LearningResult<Vec<LearningRecord>> {
        let txn = self
            .db
            .begin_read()
            .map_err(redb_err("begin_read failed"))?;
        let table = txn
            .open_table(FINDINGS_TABLE)
            .map_err(redb_err("open_table failed"))?;
        let mut records = Vec::new();
        for entry in table
            .iter()
            .map_err(redb_err("iter failed"))?
        {
            let (_, value) = entry.map_err(redb_err("iter failed"))?;
            records.push(decode(value.value())?);
        }
        Ok(records)
    }

    fn is_durable(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for DurableFeedbackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableFeedbackStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::Outcome;
    use tempfile::TempDir;

    fn bump(store: &DurableFeedbackStore, fp: &Fingerprint, outcome: Outcome) -> LearningRecord {
        store
            .update(fp, &mut |current| {
                let mut rec =
                    current.unwrap_or_else(|| LearningRecord::new(fp.clone(), "cat", "desc", 10));
                rec.apply(outcome, 11);
                rec
            })
            .unwrap()
    }

    #[test]
    fn update_creates_then_increments() {
        let dir = TempDir::new().unwrap();
        let store = DurableFeedbackStore::open(&dir.path().join("learning.redb")).unwrap();
        let fp = Fingerprint::compute("cat", "desc");

        assert!(store.get(&fp).unwrap().is_none());
        assert_eq!(bump(&store, &fp, Outcome::Rejected).rejected, 1);
        assert_eq!(bump(&store, &fp, Outcome::Rejected).rejected, 2);

        let rec = store.get(&fp).unwrap().unwrap();
        assert_eq!(rec.rejected, 2);
        assert_eq!(rec.first_seen, 10);
        assert_eq!(rec.last_seen, 11);
        assert!(store.is_durable());
    }

    #[test]
    fn scan_lists_every_record() {
        let dir = TempDir::new().unwrap();
        let store = DurableFeedbackStore::open(&dir.path().join("nested/learning.redb")).unwrap();
        assert!(store.scan().unwrap().is_empty());
        for desc in ["a", "b", "c"] {
            bump(&store, &Fingerprint::compute("cat", desc), Outcome::Accepted);
        }
        assert_eq!(store.scan().unwrap().len(), 3);
    }
}
