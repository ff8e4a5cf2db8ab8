use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::audit::{AccessAction, AuditLogEntry};
use crate::error::LedgerError;
use crate::storage::EncryptedRecord;

#[derive(Debug, Clone, FromRow)]
pub struct AccessLogRow {
    pub seq: i64,
    pub id: String,
    pub actor_id: String,
    pub subject_id: String,
    pub access_type: String,
    pub details: String,
    pub timestamp: String,
    pub prev_hash: String,
    pub current_hash: String,
}

impl TryFrom<AccessLogRow> for AuditLogEntry {
    type Error = LedgerError;

    fn try_from(row: AccessLogRow) -> Result<Self, Self::Error> {
        let seq = row.seq;
        let unreadable = move |what: String| {
            LedgerError::chain_broken(
                usize::try_from(seq).unwrap_or_default(),
                format!("stored row {} unreadable: {}", seq, what),
            )
        };

        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|e| unreadable(format!("timestamp: {}", e)))?
            .with_timezone(&Utc);
        let action: AccessAction = row.access_type.parse().map_err(unreadable)?;

        // Built field by field: the stored hash is kept as-is, never recomputed.
        Ok(AuditLogEntry {
            id: row.id,
            timestamp,
            action,
            details: row.details,
            prev_hash: row.prev_hash,
            current_hash: row.current_hash,
            subject_id: row.subject_id,
            actor_id: row.actor_id,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: String,
    pub encrypted_data: String,
    pub last_seen_us: i64,
}

impl TryFrom<RecordRow> for EncryptedRecord {
    type Error = LedgerError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let last_seen = DateTime::<Utc>::from_timestamp_micros(row.last_seen_us).ok_or_else(|| {
            LedgerError::unavailable(format!("record {} has invalid last_seen", row.id))
        })?;

        Ok(EncryptedRecord {
            id: row.id,
            ciphertext: row.encrypted_data,
            last_seen,
        })
    }
}
