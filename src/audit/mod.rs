//! Access Ledger
//!
//! Tamper-evident record of every privileged read, kept as a SHA-256 hash
//! chain that an auditor can verify independently of the append path.

pub mod chain;
pub mod entry;
pub mod verify;

pub use chain::{AppendOutcome, LedgerChain};
pub use entry::{AccessAction, AuditLogEntry, GENESIS_HASH};
pub use verify::{
    detect_forks, find_tampered_entries, verify_chain, verify_segment, BreakReason, BrokenLink,
    ChainVerification, Fork,
};
