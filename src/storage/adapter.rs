//! Persistence Adapter
//!
//! Routes every call to the durable store first and falls back to the
//! in-process store when the durable store is unreachable. Only
//! `PersistenceUnavailable` triggers the fallback path; any other error is
//! returned to the caller unchanged.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::AuditLogEntry;
use crate::error::LedgerError;
use crate::storage::{
    CircuitBreaker, EncryptedRecord, LedgerStore, MemoryStore, Sourced, StoreSource,
};

/// Run `$call` against the durable store, or against the fallback store if
/// the breaker is open or the durable call reports the store unavailable.
macro_rules! durable_or_fallback {
    ($adapter:expr, $op:literal, |$store:ident| $call:expr) => {{
        let mut answered = None;
        if $adapter.breaker.allow_request() {
            let $store: &dyn LedgerStore = $adapter.durable.as_ref();
            match $call.await {
                Ok(value) => {
                    $adapter.breaker.record_success();
                    answered = Some(Sourced::new(value, StoreSource::Durable));
                }
                Err(err) => $adapter.degrade($op, err)?,
            }
        }
        match answered {
            Some(sourced) => Ok::<_, LedgerError>(sourced),
            None => {
                let $store: &dyn LedgerStore = $adapter.fallback.as_ref();
                Ok::<_, LedgerError>(Sourced::new($call.await?, StoreSource::Fallback))
            }
        }
    }};
}

pub struct PersistenceAdapter {
    durable: Arc<dyn LedgerStore>,
    fallback: Arc<MemoryStore>,
    breaker: CircuitBreaker,
}

impl PersistenceAdapter {
    pub fn new(
        durable: Arc<dyn LedgerStore>,
        fallback: Arc<MemoryStore>,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            durable,
            fallback,
            breaker,
        }
    }

    /// True while the durable store is being skipped
    pub fn is_degraded(&self) -> bool {
        self.breaker.is_open()
    }

    fn store(&self, source: StoreSource) -> &dyn LedgerStore {
        match source {
            StoreSource::Durable => self.durable.as_ref(),
            StoreSource::Fallback => self.fallback.as_ref(),
        }
    }

    /// Swallow an unavailable-store error after recording it; pass anything else on
    fn degrade(&self, op: &str, err: LedgerError) -> Result<(), LedgerError> {
        match err {
            LedgerError::PersistenceUnavailable(reason) => {
                self.breaker.record_failure();
                warn!(
                    "Durable store unavailable during {}: {}; using fallback store (degraded mode)",
                    op, reason
                );
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Current chain head and the store that holds it
    pub async fn chain_head(&self) -> Result<Sourced<Option<AuditLogEntry>>, LedgerError> {
        durable_or_fallback!(self, "chain_head", |store| store.chain_head())
    }

    /// Chain head of one specific store
    pub async fn chain_head_from(
        &self,
        source: StoreSource,
    ) -> Result<Option<AuditLogEntry>, LedgerError> {
        self.store(source).chain_head().await
    }

    /// Append to exactly the store named by `source`; never redirects
    ///
    /// A failed durable append is recorded by the breaker and returned, so the
    /// caller can rebuild the entry against the fallback head.
    pub async fn append_to(
        &self,
        source: StoreSource,
        entry: &AuditLogEntry,
    ) -> Result<(), LedgerError> {
        let result = self.store(source).append_entry(entry).await;
        if source == StoreSource::Durable {
            match &result {
                Ok(()) => self.breaker.record_success(),
                Err(LedgerError::PersistenceUnavailable(reason)) => {
                    self.breaker.record_failure();
                    warn!("Durable ledger append failed: {}", reason);
                }
                Err(_) => {}
            }
        }
        result
    }

    /// Latest `limit` entries of whichever chain is currently serving, newest first
    pub async fn recent_entries(
        &self,
        limit: usize,
    ) -> Result<Sourced<Vec<AuditLogEntry>>, LedgerError> {
        durable_or_fallback!(self, "recent_entries", |store| store.recent_entries(limit))
    }

    /// Full chain of one store, oldest first
    pub async fn entries_from(
        &self,
        source: StoreSource,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        self.store(source).all_entries().await
    }

    /// Accesses to `subject_id` since `since`, newest first
    ///
    /// Reads both stores: entries written during an outage stay in the
    /// fallback chain but still reach the subject's notification window.
    pub async fn query_recent(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        let mut entries = Vec::new();
        if self.breaker.allow_request() {
            match self.durable.query_recent(subject_id, since).await {
                Ok(found) => {
                    self.breaker.record_success();
                    entries = found;
                }
                Err(err) => self.degrade("query_recent", err)?,
            }
        }

        let mut seen: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();
        for entry in self.fallback.query_recent(subject_id, since).await? {
            if seen.insert(entry.id.clone()) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Replay record writes and hides made during an outage
    ///
    /// Hides go first so a replayed write of the same id wins. Stops at the
    /// first unavailable error; the rest stay pending for the next call.
    async fn replay_records(&self) -> Result<(), LedgerError> {
        if !self.fallback.has_pending_records().await || !self.breaker.allow_request() {
            return Ok(());
        }

        let mut replayed = 0;
        for id in self.fallback.tombstones().await {
            match self.durable.delete_record(&id).await {
                Ok(_) => {
                    self.fallback.clear_tombstone(&id).await;
                    replayed += 1;
                }
                Err(err) => return self.degrade("replay_records", err),
            }
        }
        for record in self.fallback.pending_records().await {
            match self.durable.put_record(&record).await {
                Ok(()) => {
                    self.fallback.settle_record(&record).await;
                    replayed += 1;
                }
                Err(err) => return self.degrade("replay_records", err),
            }
        }

        self.breaker.record_success();
        info!("Replayed {} record changes to the durable store", replayed);
        Ok(())
    }

    /// Newer of the durable and fallback copies; a tombstone hides the durable one
    async fn reconcile(
        &self,
        id: &str,
        durable: Option<EncryptedRecord>,
    ) -> Result<Sourced<Option<EncryptedRecord>>, LedgerError> {
        let durable = if self.fallback.is_tombstoned(id).await {
            None
        } else {
            durable
        };
        let fallback = self.fallback.get_record(id).await?;
        Ok(match (durable, fallback) {
            (Some(d), Some(f)) if d.last_seen > f.last_seen => {
                Sourced::new(Some(d), StoreSource::Durable)
            }
            (_, Some(f)) => Sourced::new(Some(f), StoreSource::Fallback),
            (d, None) => Sourced::new(d, StoreSource::Durable),
        })
    }

    pub async fn put_record(&self, record: &EncryptedRecord) -> Result<StoreSource, LedgerError> {
        self.replay_records().await?;
        let written: Sourced<()> =
            durable_or_fallback!(self, "put_record", |store| store.put_record(record))?;
        if written.source == StoreSource::Durable {
            // the durable copy now supersedes any outage-time state
            self.fallback.delete_record(&record.id).await?;
            self.fallback.clear_tombstone(&record.id).await;
        }
        Ok(written.source)
    }

    pub async fn touch_record(
        &self,
        id: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<Sourced<bool>, LedgerError> {
        self.replay_records().await?;
        let touched: Sourced<bool> =
            durable_or_fallback!(self, "touch_record", |store| store.touch_record(id, last_seen))?;
        if touched.source == StoreSource::Durable {
            let in_fallback = self.fallback.touch_record(id, last_seen).await?;
            let visible = !self.fallback.is_tombstoned(id).await && touched.value;
            if in_fallback {
                return Ok(Sourced::new(true, StoreSource::Fallback));
            }
            return Ok(Sourced::new(visible, StoreSource::Durable));
        }
        Ok(touched)
    }

    /// Fetch a record, preferring whichever store holds the newer copy
    pub async fn get_record(
        &self,
        id: &str,
    ) -> Result<Sourced<Option<EncryptedRecord>>, LedgerError> {
        self.replay_records().await?;
        let found: Sourced<Option<EncryptedRecord>> =
            durable_or_fallback!(self, "get_record", |store| store.get_record(id))?;
        if found.source == StoreSource::Durable {
            return self.reconcile(id, found.value).await;
        }
        Ok(found)
    }

    /// Records seen at or after `since`, sorted by id
    pub async fn visible_records(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Sourced<Vec<EncryptedRecord>>, LedgerError> {
        self.replay_records().await?;
        let visible: Sourced<Vec<EncryptedRecord>> =
            durable_or_fallback!(self, "visible_records", |store| store.visible_records(since))?;
        if visible.source == StoreSource::Fallback {
            return Ok(visible);
        }

        let hidden: HashSet<String> = self.fallback.tombstones().await.into_iter().collect();
        let mut merged: BTreeMap<String, EncryptedRecord> = visible
            .value
            .into_iter()
            .filter(|r| !hidden.contains(&r.id))
            .map(|r| (r.id.clone(), r))
            .collect();
        for record in self.fallback.pending_records().await {
            let newer = merged
                .get(&record.id)
                .map_or(true, |known| record.last_seen >= known.last_seen);
            if newer {
                merged.insert(record.id.clone(), record);
            }
        }
        // pending copies were taken unfiltered
        let records: Vec<EncryptedRecord> = merged
            .into_values()
            .filter(|r| r.last_seen >= since)
            .collect();
        Ok(Sourced::new(records, StoreSource::Durable))
    }

    /// Delete a record from both stores
    ///
    /// If the durable store cannot take the delete, a tombstone keeps its copy
    /// hidden until the delete is replayed.
    pub async fn delete_record(&self, id: &str) -> Result<bool, LedgerError> {
        self.replay_records().await?;
        let deleted: Sourced<bool> =
            durable_or_fallback!(self, "delete_record", |store| store.delete_record(id))?;
        match deleted.source {
            StoreSource::Durable => {
                let in_fallback = self.fallback.delete_record(id).await?;
                Ok(deleted.value || in_fallback)
            }
            StoreSource::Fallback => {
                self.fallback.add_tombstone(id).await;
                warn!("Durable delete of {} deferred until the store recovers", id);
                Ok(true)
            }
        }
    }

    /// Probe the durable store, updating the breaker
    pub async fn probe(&self) -> bool {
        match self.durable.health_check().await {
            Ok(()) => {
                self.breaker.record_success();
                true
            }
            Err(err) => {
                self.breaker.record_failure();
                warn!("Durable store health check failed: {}", err);
                false
            }
        }
    }
}
