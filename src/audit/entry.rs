//! Access Log Entry
//!
//! Defines the structure for tamper-evident access log entries
//! with cryptographic hash chains.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// `prev_hash` of the first entry of every chain
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Kind of privileged access being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessAction {
    EmergencyDataRequest,
    EmergencyOverride,
}

impl AccessAction {
    /// Wire name, also the form that is hashed
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::EmergencyDataRequest => "EMERGENCY_DATA_REQUEST",
            AccessAction::EmergencyOverride => "EMERGENCY_OVERRIDE",
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccessAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMERGENCY_DATA_REQUEST" => Ok(AccessAction::EmergencyDataRequest),
            "EMERGENCY_OVERRIDE" => Ok(AccessAction::EmergencyOverride),
            _ => Err(format!("Invalid access action: {}", s)),
        }
    }
}

/// Access log entry with cryptographic hash chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action: AccessAction,
    pub details: String,
    pub prev_hash: String,
    pub current_hash: String,
    pub subject_id: String,
    pub actor_id: String,
}

impl AuditLogEntry {
    /// Create a new entry linked to `prev_hash`
    ///
    /// The timestamp is truncated to microseconds so the hashed text survives
    /// a round trip through storage unchanged.
    pub fn new(
        id: String,
        timestamp: DateTime<Utc>,
        action: AccessAction,
        details: String,
        prev_hash: String,
        subject_id: String,
        actor_id: String,
    ) -> Self {
        let mut entry = Self {
            id,
            timestamp: timestamp.trunc_subsecs(6),
            action,
            details,
            prev_hash,
            current_hash: String::new(), // Will be calculated
            subject_id,
            actor_id,
        };

        entry.current_hash = entry.calculate_hash();
        entry
    }

    /// Create an entry with a fresh random id
    pub fn with_fresh_id(
        timestamp: DateTime<Utc>,
        action: AccessAction,
        details: String,
        prev_hash: String,
        subject_id: String,
        actor_id: String,
    ) -> Self {
        Self::new(
            Uuid::new_v4().to_string(),
            timestamp,
            action,
            details,
            prev_hash,
            subject_id,
            actor_id,
        )
    }

    /// Canonical timestamp text used for hashing and storage
    pub fn timestamp_text(&self) -> String {
        canonical_timestamp(&self.timestamp)
    }

    /// Fields in hash order: id, timestamp, action, details, prev_hash,
    /// subject_id, actor_id. Changing this order breaks every stored chain.
    pub fn canonical_string(&self) -> String {
        format!(
            "{}{}{}{}{}{}{}",
            self.id,
            self.timestamp_text(),
            self.action.as_str(),
            self.details,
            self.prev_hash,
            self.subject_id,
            self.actor_id
        )
    }

    /// Calculate SHA256 hash of this entry (lowercase hex)
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify this entry's hash
    pub fn verify_hash(&self) -> bool {
        self.current_hash == self.calculate_hash()
    }

    pub fn is_chain_start(&self) -> bool {
        self.prev_hash == GENESIS_HASH
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} {}: {} -> {} ({})",
            self.action,
            self.id,
            self.actor_id,
            self.subject_id,
            &self.current_hash[..self.current_hash.len().min(12)]
        )
    }
}

pub fn canonical_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Timestamp for the entry following `head`
///
/// Chains are strictly increasing in time; if the clock has not moved past
/// the head, the new entry lands one microsecond after it.
pub fn next_timestamp(now: DateTime<Utc>, head: Option<&AuditLogEntry>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    match head {
        Some(head) if now <= head.timestamp => head.timestamp + chrono::Duration::microseconds(1),
        _ => now,
    }
}
