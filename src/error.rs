use thiserror::Error;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceUnavailable(format!("Database error: {}", err))
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Chain integrity error at entry {index}: {reason}")]
    ChainIntegrity { index: usize, reason: String },

    #[error("Authorization failed")]
    Authorization,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Message safe to hand to an external caller. Never carries internal detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid data",
            Self::Decryption(_) | Self::NotFound(_) => "record not available",
            Self::PersistenceUnavailable(_) => "service unavailable",
            Self::ChainIntegrity { .. } => "ledger integrity check failed",
            Self::Authorization => "access denied",
            Self::Config(_) => "internal error",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::Decryption(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::PersistenceUnavailable(msg.into())
    }

    pub fn chain_broken(index: usize, reason: impl Into<String>) -> Self {
        Self::ChainIntegrity {
            index,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
