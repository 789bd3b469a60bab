use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::pipeline::MonsterRecord;

/// Aggregate counters document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounters {
    /// Records successfully persisted
    pub total_scans: u64,

    /// Distinct sessions that have persisted at least one record
    pub sessions: u64,
}

/// Document store for monster records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a record under its session.
    async fn save_record(&self, record: &MonsterRecord) -> Result<(), PersistenceError>;

    /// All records of a session, newest first.
    async fn list_records(&self, session_id: &str) -> Result<Vec<MonsterRecord>, PersistenceError>;

    /// Count one more scan for `session_id`, returning the updated counters.
    async fn increment_counters(&self, session_id: &str) -> Result<ScanCounters, PersistenceError>;

    async fn counters(&self) -> Result<ScanCounters, PersistenceError>;
}

#[derive(Default)]
struct CounterState {
    total_scans: u64,
    sessions: HashSet<String>,
}

impl CounterState {
    fn snapshot(&self) -> ScanCounters {
        ScanCounters {
            total_scans: self.total_scans,
            sessions: self.sessions.len() as u64,
        }
    }
}

/// Process-local [`RecordStore`].
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, Vec<MonsterRecord>>>,
    counters: RwLock<CounterState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all sessions.
    pub fn len(&self) -> usize {
        self.records.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save_record(&self, record: &MonsterRecord) -> Result<(), PersistenceError> {
        self.records
            .write()
            .entry(record.session_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn list_records(&self, session_id: &str) -> Result<Vec<MonsterRecord>, PersistenceError> {
        let mut records = self
            .records
            .read()
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        // Later insertions first on equal timestamps
        records.reverse();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn increment_counters(&self, session_id: &str) -> Result<ScanCounters, PersistenceError> {
        let mut counters = self.counters.write();
        counters.total_scans += 1;
        if !counters.sessions.contains(session_id) {
            counters.sessions.insert(session_id.to_string());
        }
        let snapshot = counters.snapshot();
        Ok(snapshot)
    }

    async fn counters(&self) -> Result<ScanCounters, PersistenceError> {
        Ok(self.counters.read().snapshot())
    }
}
