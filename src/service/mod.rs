//! Access Service
//!
//! External operations of the ledger: record intake, visibility, emergency
//! access and auditor reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AccessAction, AuditLogEntry, ChainVerification, LedgerChain};
use crate::authorization::AccessGate;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::crypto::RecordVault;
use crate::error::LedgerError;
use crate::presence::PresenceDirectory;
use crate::storage::{CircuitBreaker, LedgerStore, MemoryStore, PersistenceAdapter, StoreSource};
use crate::validation::{
    check_identity, check_safe_text, PayloadValidator, RecordPayload, SchemaValidator,
};

/// Details recorded when an emergency fetch gives no reason
pub const DEFAULT_ACCESS_REASON: &str = "EMERGENCY_DATA_REQ";

/// Page of ledger entries, newest first, with the chain that supplied it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerPage {
    pub entries: Vec<AuditLogEntry>,
    pub source: StoreSource,
}

/// Listing summary of a visible record
///
/// Carries only what a responder needs to pick a record; the full payload
/// is released by [`AccessService::emergency_fetch`], which logs the access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    pub id: String,
    pub name: String,
    pub condition: Option<String>,
    pub last_seen: DateTime<Utc>,
}

/// Result of an emergency fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyAccess {
    pub record: RecordPayload,
    pub access_log: AuditLogEntry,
    pub source: StoreSource,
}

/// Per-store verification for the auditor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub durable: Option<ChainVerification>,
    pub fallback: ChainVerification,
}

impl LedgerAudit {
    pub fn is_valid(&self) -> bool {
        self.fallback.is_valid && self.durable.as_ref().map_or(true, |d| d.is_valid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub degraded: bool,
    pub head_source: StoreSource,
    pub head_hash: Option<String>,
    pub fallback_entries: usize,
}

pub struct AccessService {
    vault: RecordVault,
    chain: LedgerChain,
    presence: PresenceDirectory,
    gate: AccessGate,
    validator: Box<dyn PayloadValidator>,
    fallback: Arc<MemoryStore>,
    config: AppConfig,
}

impl AccessService {
    /// Wire up the service over `durable`, with a fresh fallback store
    pub fn new(
        config: AppConfig,
        durable: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LedgerError> {
        let vault = RecordVault::from_secret(&config.vault.encryption_secret)?;
        let fallback = Arc::new(MemoryStore::new(config.fallback.capacity));
        let breaker = CircuitBreaker::new(
            config.breaker.failure_threshold,
            config.breaker.cooldown(),
            clock.clone(),
        );
        let adapter = Arc::new(PersistenceAdapter::new(durable, fallback.clone(), breaker));

        Ok(Self {
            vault,
            chain: LedgerChain::new(adapter.clone(), clock.clone()),
            presence: PresenceDirectory::new(
                adapter,
                clock,
                config.presence.activity_window(),
            ),
            gate: AccessGate::new(config.auditor.secret.clone()),
            validator: Box::new(SchemaValidator),
            fallback,
            config,
        })
    }

    /// Replace the default schema validator
    pub fn with_validator(mut self, validator: Box<dyn PayloadValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn chain(&self) -> &LedgerChain {
        &self.chain
    }

    pub fn presence(&self) -> &PresenceDirectory {
        &self.presence
    }

    /// Validate, encrypt and store a record, marking it seen now
    pub async fn submit_record(
        &self,
        id: &str,
        payload: &RecordPayload,
    ) -> Result<StoreSource, LedgerError> {
        self.validator.validate(id, payload)?;
        let ciphertext = self.vault.encrypt(payload)?;
        let source = self.presence.publish(id, ciphertext).await?;
        info!("Stored record {} ({} schema) in {} store", id, payload.schema_version(), source);
        Ok(source)
    }

    /// Turn visibility on or off
    ///
    /// On: refreshes `last_seen` (and the payload if one is given) and returns
    /// accesses within the notify window, newest first. Turning on without a
    /// payload needs a stored record. Off: deletes the record and returns
    /// nothing.
    pub async fn set_visibility(
        &self,
        id: &str,
        visible: bool,
        payload: Option<&RecordPayload>,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        check_identity("record id", id)?;

        if !visible {
            self.presence.hide(id).await?;
            return Ok(Vec::new());
        }

        match payload {
            Some(payload) => {
                self.submit_record(id, payload).await?;
            }
            None => {
                if !self.presence.heartbeat(id).await? {
                    return Err(LedgerError::NotFound(format!("record {}", id)));
                }
            }
        }
        self.presence
            .recent_access(id, self.config.presence.notify_window())
            .await
    }

    /// Latest entries of the serving chain, for the holder of the auditor secret
    pub async fn read_ledger(&self, secret: &str, limit: usize) -> Result<LedgerPage, LedgerError> {
        self.gate.require(secret)?;
        let limit = limit.clamp(1, self.config.auditor.ledger_read_limit.max(1));
        let page = self.chain.adapter().recent_entries(limit).await?;
        Ok(LedgerPage {
            entries: page.value,
            source: page.source,
        })
    }

    /// Verify each store's chain separately
    ///
    /// The durable result is `None` when the durable store cannot be read.
    pub async fn verify_ledger(&self, secret: &str) -> Result<LedgerAudit, LedgerError> {
        self.gate.require(secret)?;
        let durable = match self.chain.verify(StoreSource::Durable).await {
            Ok(verification) => Some(verification),
            Err(LedgerError::PersistenceUnavailable(reason)) => {
                warn!("Durable ledger not verifiable: {}", reason);
                None
            }
            Err(err) => return Err(err),
        };
        let fallback = self.chain.verify(StoreSource::Fallback).await?;
        Ok(LedgerAudit { durable, fallback })
    }

    /// Summaries of visible records; records that fail to decrypt are skipped
    pub async fn list_records(&self) -> Result<Vec<RecordView>, LedgerError> {
        let records = self
            .presence
            .visible_records(self.config.presence.activity_window())
            .await?;

        let mut views = Vec::with_capacity(records.len());
        for record in records {
            match self.vault.decrypt(&record.ciphertext) {
                Ok(payload) => views.push(RecordView {
                    id: record.id,
                    name: payload.display_name().to_string(),
                    condition: payload.primary_condition().map(str::to_string),
                    last_seen: record.last_seen,
                }),
                Err(err) => warn!("Skipping record {}: {}", record.id, err),
            }
        }
        Ok(views)
    }

    /// Decrypt a record and log the access
    ///
    /// Fetching a record outside its visibility window is logged as an
    /// override rather than a regular request.
    pub async fn emergency_fetch(
        &self,
        record_id: &str,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<EmergencyAccess, LedgerError> {
        check_identity("record id", record_id)?;
        check_identity("actor id", actor_id)?;
        let details = match reason {
            Some(reason) => {
                check_safe_text("reason", reason)?;
                reason
            }
            None => DEFAULT_ACCESS_REASON,
        };

        let stored = self
            .chain
            .adapter()
            .get_record(record_id)
            .await?
            .value
            .ok_or_else(|| LedgerError::NotFound(format!("record {}", record_id)))?;
        let record = self.vault.decrypt(&stored.ciphertext)?;

        let window = self.config.presence.activity_window();
        let action = if self.presence.now() - stored.last_seen <= window {
            AccessAction::EmergencyDataRequest
        } else {
            AccessAction::EmergencyOverride
        };

        let outcome = self.chain.append(actor_id, record_id, action, details).await?;
        info!("{} accessed {} ({})", actor_id, record_id, action);

        Ok(EmergencyAccess {
            record,
            access_log: outcome.entry,
            source: outcome.source,
        })
    }

    pub async fn status(&self) -> Result<ServiceStatus, LedgerError> {
        let head = self.chain.head().await?;
        Ok(ServiceStatus {
            degraded: self.chain.adapter().is_degraded(),
            head_source: head.source,
            head_hash: head.value.map(|entry| entry.current_hash),
            fallback_entries: self.fallback.entry_count().await,
        })
    }

    /// Probe the durable store
    pub async fn health(&self) -> bool {
        self.chain.adapter().probe().await
    }
}
