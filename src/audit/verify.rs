//! Ledger Verification
//!
//! Independent integrity checks over a sequence of entries. Nothing here
//! touches the append path, so an auditor can validate an exported ledger
//! without trusting the service that wrote it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{error, info};

use crate::audit::entry::{AuditLogEntry, GENESIS_HASH};
use crate::error::LedgerError;

/// Why a chain failed verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    /// Stored hash does not match the recomputed one
    HashMismatch,
    /// `prev_hash` does not equal the previous entry's hash
    BrokenLink,
    /// First entry of an anchored chain does not start from genesis
    MissingGenesis,
    /// Timestamp is not after the previous entry's
    NonMonotonicTimestamp,
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BreakReason::HashMismatch => "hash mismatch",
            BreakReason::BrokenLink => "broken link",
            BreakReason::MissingGenesis => "missing genesis link",
            BreakReason::NonMonotonicTimestamp => "non-monotonic timestamp",
        };
        write!(f, "{}", text)
    }
}

/// First point at which a chain stops being valid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLink {
    pub index: usize,
    pub entry_id: String,
    pub reason: BreakReason,
}

/// Verification result with detailed information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub is_valid: bool,
    pub entry_count: usize,
    pub first_broken: Option<BrokenLink>,
}

impl ChainVerification {
    /// Index of the first broken entry, if any
    pub fn broken_index(&self) -> Option<usize> {
        self.first_broken.as_ref().map(|b| b.index)
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match &self.first_broken {
            None => format!("Ledger is valid ({} entries)", self.entry_count),
            Some(broken) => format!(
                "Ledger is invalid ({} entries): {} at entry {} ({})",
                self.entry_count, broken.reason, broken.index, broken.entry_id
            ),
        }
    }

    /// Convert a failed verification into a `ChainIntegrity` error
    pub fn ensure_intact(&self) -> Result<(), LedgerError> {
        match &self.first_broken {
            None => Ok(()),
            Some(broken) => Err(LedgerError::chain_broken(
                broken.index,
                broken.reason.to_string(),
            )),
        }
    }
}

/// Verify a complete chain, oldest first, whose first entry links to genesis
pub fn verify_chain(entries: &[AuditLogEntry]) -> ChainVerification {
    verify(entries, true)
}

/// Verify a window of a chain, oldest first, without requiring it to start
/// at genesis. The first entry's own hash is still checked.
pub fn verify_segment(entries: &[AuditLogEntry]) -> ChainVerification {
    verify(entries, false)
}

fn verify(entries: &[AuditLogEntry], anchored: bool) -> ChainVerification {
    let first_broken = find_first_break(entries, anchored);

    match &first_broken {
        None => info!("Ledger verification successful: {} entries", entries.len()),
        Some(broken) => error!(
            "Ledger verification failed: {} at entry {} ({})",
            broken.reason, broken.index, broken.entry_id
        ),
    }

    ChainVerification {
        is_valid: first_broken.is_none(),
        entry_count: entries.len(),
        first_broken,
    }
}

fn find_first_break(entries: &[AuditLogEntry], anchored: bool) -> Option<BrokenLink> {
    let broken = |index: usize, reason: BreakReason| BrokenLink {
        index,
        entry_id: entries[index].id.clone(),
        reason,
    };

    for (i, entry) in entries.iter().enumerate() {
        if entry.calculate_hash() != entry.current_hash {
            return Some(broken(i, BreakReason::HashMismatch));
        }

        if i == 0 {
            if anchored && entry.prev_hash != GENESIS_HASH {
                return Some(broken(i, BreakReason::MissingGenesis));
            }
            continue;
        }

        let prev = &entries[i - 1];
        if entry.prev_hash != prev.current_hash {
            return Some(broken(i, BreakReason::BrokenLink));
        }

        if entry.timestamp <= prev.timestamp {
            return Some(broken(i, BreakReason::NonMonotonicTimestamp));
        }
    }

    None
}

/// Find every entry whose stored hash does not recompute
pub fn find_tampered_entries(entries: &[AuditLogEntry]) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.verify_hash())
        .map(|(i, _)| i)
        .collect()
}

/// Two or more entries claiming the same predecessor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fork {
    pub prev_hash: String,
    pub entry_ids: Vec<String>,
}

/// Detect forks: `prev_hash` values shared by more than one entry
pub fn detect_forks(entries: &[AuditLogEntry]) -> Vec<Fork> {
    let mut by_parent: HashMap<&str, Vec<&AuditLogEntry>> = HashMap::new();
    for entry in entries {
        by_parent.entry(entry.prev_hash.as_str()).or_default().push(entry);
    }

    let mut forks: Vec<Fork> = by_parent
        .into_iter()
        .filter(|(_, children)| children.len() > 1)
        .map(|(prev_hash, children)| Fork {
            prev_hash: prev_hash.to_string(),
            entry_ids: children.iter().map(|e| e.id.clone()).collect(),
        })
        .collect();
    forks.sort_by(|a, b| a.prev_hash.cmp(&b.prev_hash));
    forks
}
