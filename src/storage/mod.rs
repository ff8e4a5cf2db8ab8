//! Persistence
//!
//! Ledger entries and encrypted record snapshots live behind the
//! [`LedgerStore`] trait. The durable implementation is
//! [`crate::database::Database`]; [`MemoryStore`] is the bounded in-process
//! fallback. [`PersistenceAdapter`] chooses between them and reports which
//! one answered.

pub mod adapter;
pub mod breaker;
pub mod memory;

pub use adapter::PersistenceAdapter;
pub use breaker::CircuitBreaker;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audit::AuditLogEntry;
use crate::error::LedgerError;

/// Encrypted payload of one record identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub id: String,
    pub ciphertext: String,
    pub last_seen: DateTime<Utc>,
}

/// Which store answered a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSource {
    Durable,
    Fallback,
}

impl StoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreSource::Durable => "durable",
            StoreSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for StoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value together with the store that supplied it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: StoreSource,
}

impl<T> Sourced<T> {
    pub fn new(value: T, source: StoreSource) -> Self {
        Self { value, source }
    }
}

/// Storage contract shared by the durable store and the fallback store
///
/// Ledger methods never update or delete entries. `append_entry` refuses an
/// entry whose `prev_hash` is not this store's current head hash (or genesis
/// when the store is empty), so a chain can never be linked across stores.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append_entry(&self, entry: &AuditLogEntry) -> Result<(), LedgerError>;

    /// Most recently appended entry
    async fn chain_head(&self) -> Result<Option<AuditLogEntry>, LedgerError>;

    /// Entries about `subject_id` at or after `since`, newest first
    async fn query_recent(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditLogEntry>, LedgerError>;

    /// Latest `limit` entries, newest first
    async fn recent_entries(&self, limit: usize) -> Result<Vec<AuditLogEntry>, LedgerError>;

    /// Every retained entry, oldest first
    async fn all_entries(&self) -> Result<Vec<AuditLogEntry>, LedgerError>;

    /// Insert or replace a record; `last_seen` is taken from the record
    async fn put_record(&self, record: &EncryptedRecord) -> Result<(), LedgerError>;

    /// Refresh `last_seen`; returns false when no record exists
    async fn touch_record(&self, id: &str, last_seen: DateTime<Utc>) -> Result<bool, LedgerError>;

    async fn get_record(&self, id: &str) -> Result<Option<EncryptedRecord>, LedgerError>;

    /// Records with `last_seen >= since`
    async fn visible_records(&self, since: DateTime<Utc>)
        -> Result<Vec<EncryptedRecord>, LedgerError>;

    /// Returns true if a record was removed
    async fn delete_record(&self, id: &str) -> Result<bool, LedgerError>;

    async fn health_check(&self) -> Result<(), LedgerError>;
}
