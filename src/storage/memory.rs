//! In-process fallback store
//!
//! Bounded ring buffer of ledger entries plus a record map. Used only while
//! the durable store is unreachable; contents are lost on restart.
//!
//! Record writes and hides made here are pending until the adapter replays
//! them to the durable store. A hide is kept as a tombstone so the durable
//! copy stays hidden in the meantime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::audit::{AuditLogEntry, GENESIS_HASH};
use crate::error::LedgerError;
use crate::storage::{EncryptedRecord, LedgerStore};

pub struct MemoryStore {
    capacity: usize,
    entries: RwLock<VecDeque<AuditLogEntry>>,
    records: RwLock<HashMap<String, EncryptedRecord>>,
    tombstones: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            records: RwLock::new(HashMap::new()),
            tombstones: RwLock::new(HashSet::new()),
        }
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True while records or hides are waiting to be replayed
    pub async fn has_pending_records(&self) -> bool {
        !self.records.read().await.is_empty() || !self.tombstones.read().await.is_empty()
    }

    pub async fn pending_records(&self) -> Vec<EncryptedRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Drop `record` once replayed, unless it changed in the meantime
    pub async fn settle_record(&self, record: &EncryptedRecord) -> bool {
        let mut records = self.records.write().await;
        if records.get(&record.id) == Some(record) {
            records.remove(&record.id);
            return true;
        }
        false
    }

    pub async fn add_tombstone(&self, id: &str) {
        self.tombstones.write().await.insert(id.to_string());
    }

    pub async fn clear_tombstone(&self, id: &str) -> bool {
        self.tombstones.write().await.remove(id)
    }

    pub async fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.read().await.contains(id)
    }

    pub async fn tombstones(&self) -> Vec<String> {
        self.tombstones.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_entry(&self, entry: &AuditLogEntry) -> Result<(), LedgerError> {
        let mut entries = self.entries.write().await;

        let head_hash = entries
            .back()
            .map(|head| head.current_hash.as_str())
            .unwrap_or(GENESIS_HASH);
        if entry.prev_hash != head_hash {
            return Err(LedgerError::chain_broken(
                entries.len(),
                "entry does not link to the fallback chain head",
            ));
        }

        if entries.len() == self.capacity {
            if let Some(evicted) = entries.pop_front() {
                warn!(
                    "Fallback ledger full ({} entries); evicting {}",
                    self.capacity, evicted.id
                );
            }
        }
        entries.push_back(entry.clone());
        debug!("Appended fallback ledger entry: {}", entry.summary());
        Ok(())
    }

    async fn chain_head(&self) -> Result<Option<AuditLogEntry>, LedgerError> {
        Ok(self.entries.read().await.back().cloned())
    }

    async fn query_recent(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| e.subject_id == subject_id && e.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn recent_entries(&self, limit: usize) -> Result<Vec<AuditLogEntry>, LedgerError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn all_entries(&self) -> Result<Vec<AuditLogEntry>, LedgerError> {
        Ok(self.entries.read().await.iter().cloned().collect())
    }

    async fn put_record(&self, record: &EncryptedRecord) -> Result<(), LedgerError> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn touch_record(&self, id: &str, last_seen: DateTime<Utc>) -> Result<bool, LedgerError> {
        match self.records.write().await.get_mut(id) {
            Some(record) => {
                record.last_seen = last_seen;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_record(&self, id: &str) -> Result<Option<EncryptedRecord>, LedgerError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn visible_records(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<EncryptedRecord>, LedgerError> {
        let mut visible: Vec<EncryptedRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.last_seen >= since)
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(visible)
    }

    async fn delete_record(&self, id: &str) -> Result<bool, LedgerError> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}
