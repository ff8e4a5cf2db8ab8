//! Intake validation
//!
//! Everything submitted for storage passes through a [`PayloadValidator`]
//! before encryption. The default [`SchemaValidator`] applies the versioned
//! schema rules; deployments with their own sanitization rules plug in a
//! different implementation.

pub mod guards;
pub mod payload;

pub use guards::{check_identity, check_safe_text};
pub use payload::{BloodType, EmergencyProfileV1, RecordPayload};

use crate::error::LedgerError;

/// Boundary between raw submissions and the vault
pub trait PayloadValidator: Send + Sync {
    fn validate(&self, record_id: &str, payload: &RecordPayload) -> Result<(), LedgerError>;
}

/// Validator applying identity guards and the payload's schema rules
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator;

impl PayloadValidator for SchemaValidator {
    fn validate(&self, record_id: &str, payload: &RecordPayload) -> Result<(), LedgerError> {
        check_identity("record id", record_id)?;
        payload.validate()
    }
}
