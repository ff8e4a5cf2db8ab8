#![allow(dead_code)]

use access_ledger::clock::ManualClock;
use access_ledger::config::AppConfig;
use access_ledger::database::Database;
use access_ledger::service::AccessService;
use access_ledger::storage::LedgerStore;
use access_ledger::validation::{BloodType, EmergencyProfileV1, RecordPayload};
use chrono::Utc;
use std::sync::Arc;

pub const VAULT_SECRET: &str = "test-vault-secret";
pub const AUDITOR_SECRET: &str = "test-auditor-secret";

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    Database::new_in_memory().await.expect("Failed to create test database")
}

/// Default configuration with test secrets filled in
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.vault.encryption_secret = VAULT_SECRET.to_string();
    config.auditor.secret = AUDITOR_SECRET.to_string();
    config
}

pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc::now()))
}

/// Service over `durable` driven by `clock`
pub fn build_service(durable: Arc<dyn LedgerStore>, clock: Arc<ManualClock>) -> AccessService {
    AccessService::new(test_config(), durable, clock).expect("Failed to build service")
}

pub fn sample_payload(name: &str) -> RecordPayload {
    RecordPayload::V1(EmergencyProfileV1 {
        name: name.to_string(),
        age: 34,
        weight: 62.0,
        blood_type: BloodType::APos,
        conditions: vec!["type 1 diabetes".to_string()],
        medications: vec!["insulin".to_string()],
        allergies: vec![],
    })
}
