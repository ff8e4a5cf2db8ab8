//! Cryptographic primitives used by the service
//!
//! Record payloads are encrypted at rest by the [`RecordVault`]. Ledger
//! hashing lives with the ledger entries in [`crate::audit`].

pub mod vault;

pub use vault::RecordVault;
