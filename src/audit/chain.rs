//! Ledger Chain
//!
//! Single append path for the access ledger. Reading the head, building the
//! next entry and writing it happen under one async mutex, so no two entries
//! of a chain can share a `prev_hash`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::audit::entry::{next_timestamp, AccessAction, AuditLogEntry, GENESIS_HASH};
use crate::audit::verify::{verify_chain, verify_segment, ChainVerification};
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::storage::{PersistenceAdapter, Sourced, StoreSource};

/// A newly written entry and the chain it was written to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub entry: AuditLogEntry,
    pub source: StoreSource,
}

pub struct LedgerChain {
    adapter: Arc<PersistenceAdapter>,
    clock: Arc<dyn Clock>,
    append_lock: Mutex<()>,
}

impl LedgerChain {
    pub fn new(adapter: Arc<PersistenceAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            adapter,
            clock,
            append_lock: Mutex::new(()),
        }
    }

    pub fn adapter(&self) -> &Arc<PersistenceAdapter> {
        &self.adapter
    }

    fn build_entry(
        &self,
        head: Option<&AuditLogEntry>,
        actor_id: &str,
        subject_id: &str,
        action: AccessAction,
        details: &str,
    ) -> AuditLogEntry {
        let prev_hash = head
            .map(|h| h.current_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        AuditLogEntry::with_fresh_id(
            next_timestamp(self.clock.now(), head),
            action,
            details.to_string(),
            prev_hash,
            subject_id.to_string(),
            actor_id.to_string(),
        )
    }

    /// Append one access entry
    ///
    /// The entry is written to the store that supplied the head. If that was
    /// the durable store and the write fails, the entry is rebuilt on top of
    /// the fallback head and written there instead.
    pub async fn append(
        &self,
        actor_id: &str,
        subject_id: &str,
        action: AccessAction,
        details: &str,
    ) -> Result<AppendOutcome, LedgerError> {
        let _guard = self.append_lock.lock().await;

        let head = self.adapter.chain_head().await?;
        let entry = self.build_entry(head.value.as_ref(), actor_id, subject_id, action, details);

        match self.adapter.append_to(head.source, &entry).await {
            Ok(()) => {
                debug!("Appended {} to {} ledger", entry.summary(), head.source);
                Ok(AppendOutcome {
                    entry,
                    source: head.source,
                })
            }
            Err(LedgerError::PersistenceUnavailable(_)) if head.source == StoreSource::Durable => {
                let fallback_head = self.adapter.chain_head_from(StoreSource::Fallback).await?;
                let entry = self.build_entry(
                    fallback_head.as_ref(),
                    actor_id,
                    subject_id,
                    action,
                    details,
                );
                self.adapter.append_to(StoreSource::Fallback, &entry).await?;
                warn!(
                    "Appended {} to fallback ledger (degraded mode); durable chain unchanged",
                    entry.summary()
                );
                Ok(AppendOutcome {
                    entry,
                    source: StoreSource::Fallback,
                })
            }
            Err(err) => {
                if let LedgerError::ChainIntegrity { .. } = err {
                    error!("Ledger append rejected: {}", err);
                }
                Err(err)
            }
        }
    }

    /// Current head of whichever chain is serving
    pub async fn head(&self) -> Result<Sourced<Option<AuditLogEntry>>, LedgerError> {
        self.adapter.chain_head().await
    }

    /// Verify the chain held by one store
    ///
    /// The fallback store is a ring buffer that may have evicted its chain
    /// start, so it is checked as an unanchored segment.
    pub async fn verify(&self, source: StoreSource) -> Result<ChainVerification, LedgerError> {
        let entries = self.adapter.entries_from(source).await?;
        let verification = match source {
            StoreSource::Durable => verify_chain(&entries),
            StoreSource::Fallback => verify_segment(&entries),
        };
        if !verification.is_valid {
            error!("{} ledger failed verification: {}", source, verification.summary());
        }
        Ok(verification)
    }
}
