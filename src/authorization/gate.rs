//! Access Gate
//!
//! Guards ledger reads behind the auditor secret.

use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::LedgerError;

pub struct AccessGate {
    secret: Vec<u8>,
}

impl AccessGate {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    /// Length check first, then a comparison that reads every byte
    pub fn authorize(&self, candidate: &str) -> bool {
        let candidate = candidate.as_bytes();
        if candidate.len() != self.secret.len() {
            return false;
        }
        bool::from(candidate.ct_eq(&self.secret))
    }

    /// Like [`AccessGate::authorize`], as a `Result`
    pub fn require(&self, candidate: &str) -> Result<(), LedgerError> {
        if self.authorize(candidate) {
            Ok(())
        } else {
            warn!("Rejected ledger access with invalid credential");
            Err(LedgerError::Authorization)
        }
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_only() {
        let gate = AccessGate::new("s3cret-auditor");
        assert!(gate.authorize("s3cret-auditor"));
        assert!(!gate.authorize("s3cret-auditoR"));
        assert!(!gate.authorize("X3cret-auditor"));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let gate = AccessGate::new("s3cret-auditor");
        assert!(!gate.authorize(""));
        assert!(!gate.authorize("s3cret"));
        assert!(!gate.authorize("s3cret-auditor-and-more"));
    }

    #[test]
    fn test_require_is_generic() {
        let gate = AccessGate::new("abc");
        let err = gate.require("abd").unwrap_err();
        assert!(matches!(err, LedgerError::Authorization));
        assert_eq!(err.public_message(), "access denied");
        assert!(!format!("{:?}", gate).contains("abc"));
    }
}
