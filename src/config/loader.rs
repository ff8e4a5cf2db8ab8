//! Configuration loader
//! Layers built-in defaults, an optional TOML file and `ACCESS_LEDGER__*`
//! environment variables.

use config::{Config, Environment, File};
use tracing::info;

use crate::config::AppConfig;
use crate::error::LedgerError;

pub const DEFAULT_CONFIG_FILE: &str = "access-ledger";
pub const ENV_PREFIX: &str = "ACCESS_LEDGER";

impl AppConfig {
    /// Load configuration from `access-ledger.toml` (if present) and the environment
    pub fn load() -> Result<Self, LedgerError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration using `file_stem` as the optional config file
    pub fn load_from(file_stem: &str) -> Result<Self, LedgerError> {
        let defaults = Config::try_from(&AppConfig::default())?;

        let config: AppConfig = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name(file_stem).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        info!(
            "Configuration loaded (activity window {}s, notify window {}s)",
            config.presence.activity_window_secs, config.presence.notify_window_secs
        );
        Ok(config)
    }

    /// Validate the loaded configuration
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.vault.encryption_secret.trim().is_empty() {
            return Err(LedgerError::Config(
                "vault.encryption_secret must be set".to_string(),
            ));
        }

        if self.auditor.secret.is_empty() {
            return Err(LedgerError::Config("auditor.secret must be set".to_string()));
        }

        if self.auditor.ledger_read_limit == 0 {
            return Err(LedgerError::Config(
                "auditor.ledger_read_limit must be positive".to_string(),
            ));
        }

        if self.presence.activity_window_secs <= 0 || self.presence.notify_window_secs <= 0 {
            return Err(LedgerError::Config(format!(
                "presence windows must be positive (activity {}s, notify {}s)",
                self.presence.activity_window_secs, self.presence.notify_window_secs
            )));
        }

        if self.fallback.capacity == 0 {
            return Err(LedgerError::Config(
                "fallback.capacity must be positive".to_string(),
            ));
        }

        if self.breaker.failure_threshold == 0 || self.breaker.cooldown_secs < 0 {
            return Err(LedgerError::Config(format!(
                "invalid breaker settings (threshold {}, cooldown {}s)",
                self.breaker.failure_threshold, self.breaker.cooldown_secs
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.vault.encryption_secret = "vault-secret".to_string();
        config.auditor.secret = "4821".to_string();
        config
    }

    #[test]
    fn test_defaults_require_secrets() {
        let result = AppConfig::default().validate();
        assert!(matches!(result, Err(LedgerError::Config(_))));
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_windows() {
        let mut config = configured();
        config.presence.notify_window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(
            &path,
            r#"
[vault]
encryption_secret = "file-secret"

[auditor]
secret = "9999"
ledger_read_limit = 10

[presence]
activity_window_secs = 120
notify_window_secs = 15
"#,
        )
        .unwrap();

        let stem = path.with_extension("");
        let config = AppConfig::load_from(stem.to_str().unwrap()).unwrap();
        assert_eq!(config.vault.encryption_secret, "file-secret");
        assert_eq!(config.auditor.ledger_read_limit, 10);
        assert_eq!(config.presence.activity_window().num_seconds(), 120);
        assert_eq!(config.server.port, 3000);
    }
}
