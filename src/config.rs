use chrono::Duration;
use serde::{Deserialize, Serialize};

pub mod loader;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub vault: VaultConfig,
    pub auditor: AuditorConfig,
    pub presence: PresenceConfig,
    pub fallback: FallbackConfig,
    pub breaker: BreakerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Secret the record encryption key is derived from.
    pub encryption_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditorConfig {
    pub secret: String,
    /// Maximum number of entries returned by a ledger read.
    pub ledger_read_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// How long a record stays discoverable after its last heartbeat.
    pub activity_window_secs: i64,
    /// How far back an owner is notified about accesses to its record.
    pub notify_window_secs: i64,
}

impl PresenceConfig {
    pub fn activity_window(&self) -> Duration {
        Duration::seconds(self.activity_window_secs)
    }

    pub fn notify_window(&self) -> Duration {
        Duration::seconds(self.notify_window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Ring buffer size of the in-process ledger used while the database is down.
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_secs: i64,
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite://access-ledger.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            vault: VaultConfig {
                encryption_secret: String::new(),
            },
            auditor: AuditorConfig {
                secret: String::new(),
                ledger_read_limit: 50,
            },
            presence: PresenceConfig {
                activity_window_secs: 300,
                notify_window_secs: 30,
            },
            fallback: FallbackConfig { capacity: 1024 },
            breaker: BreakerConfig {
                failure_threshold: 3,
                cooldown_secs: 30,
            },
        }
    }
}
