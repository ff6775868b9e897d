//! Durable per-topic message log using redb
//!
//! The gossip transport appends every observed payload here and serves
//! history queries from it. Keys are `(topic hex, sequence)` so a single
//! range scan yields one topic's log oldest first.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::WoteResult;
use crate::topic::Topic;

const TOPIC_LOG_TABLE: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("topic_log");

/// Append-only message log, keyed by topic and sequence number.
#[derive(Clone)]
pub struct HistoryStore {
    db: Arc<RwLock<Database>>,
}

impl HistoryStore {
    /// Open (or create) the log at the given path.
    pub fn open(path: impl AsRef<Path>) -> WoteResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TOPIC_LOG_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Append a payload to a topic's log, returning its sequence number.
    pub fn append(&self, topic: &Topic, payload: &[u8]) -> WoteResult<u64> {
        let key = topic.to_hex();
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let seq;
        {
            let mut table = write_txn.open_table(TOPIC_LOG_TABLE)?;
            seq = {
                let last = table
                    .range((key.as_str(), 0u64)..=(key.as_str(), u64::MAX))?
                    .next_back();
                match last {
                    Some(entry) => entry?.0.value().1 + 1,
                    None => 0,
                }
            };
            table.insert((key.as_str(), seq), payload)?;
        }
        write_txn.commit()?;
        Ok(seq)
    }

    /// Load a topic's full log, oldest first.
    pub fn load(&self, topic: &Topic) -> WoteResult<Vec<Vec<u8>>> {
        let key = topic.to_hex();
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(TOPIC_LOG_TABLE)?;

        let mut messages = Vec::new();
        for entry in table.range((key.as_str(), 0u64)..=(key.as_str(), u64::MAX))? {
            let (_, value) = entry?;
            messages.push(value.value().to_vec());
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KEY_LEN;
    use tempfile::TempDir;

    fn topic(byte: u8) -> Topic {
        Topic::from_bytes([byte; KEY_LEN])
    }

    #[test]
    fn test_append_assigns_increasing_sequences() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::open(dir.path().join("log.redb")).unwrap();
        let t = topic(1);

        assert_eq!(store.append(&t, b"a").unwrap(), 0);
        assert_eq!(store.append(&t, b"b").unwrap(), 1);
        assert_eq!(store.append(&t, b"c").unwrap(), 2);
    }

    #[test]
    fn test_load_returns_oldest_first() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::open(dir.path().join("log.redb")).unwrap();
        let t = topic(1);

        store.append(&t, b"one").unwrap();
        store.append(&t, b"two").unwrap();

        assert_eq!(store.load(&t).unwrap(), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_topics_do_not_mix() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::open(dir.path().join("log.redb")).unwrap();

        store.append(&topic(1), b"for-one").unwrap();
        store.append(&topic(2), b"for-two").unwrap();

        assert_eq!(store.load(&topic(1)).unwrap(), vec![b"for-one".to_vec()]);
        assert_eq!(store.load(&topic(2)).unwrap(), vec![b"for-two".to_vec()]);
    }

    #[test]
    fn test_log_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.redb");
        let t = topic(1);

        {
            let store = HistoryStore::open(&path).unwrap();
            store.append(&t, b"persisted").unwrap();
        }

        let store = HistoryStore::open(&path).unwrap();
        assert_eq!(store.load(&t).unwrap(), vec![b"persisted".to_vec()]);
        // Sequence numbering continues where it left off
        assert_eq!(store.append(&t, b"next").unwrap(), 1);
    }

    #[test]
    fn test_empty_topic_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::open(dir.path().join("log.redb")).unwrap();
        assert!(store.load(&topic(9)).unwrap().is_empty());
    }
}
