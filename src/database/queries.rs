use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::{AuditLogEntry, GENESIS_HASH};
use crate::database::models::{AccessLogRow, RecordRow};
use crate::database::Database;
use crate::error::LedgerError;
use crate::storage::{EncryptedRecord, LedgerStore};

const ACCESS_LOG_COLUMNS: &str =
    "seq, id, actor_id, subject_id, access_type, details, timestamp, prev_hash, current_hash";

fn into_entries(rows: Vec<AccessLogRow>) -> Result<Vec<AuditLogEntry>, LedgerError> {
    rows.into_iter().map(AuditLogEntry::try_from).collect()
}

fn into_records(rows: Vec<RecordRow>) -> Result<Vec<EncryptedRecord>, LedgerError> {
    rows.into_iter().map(EncryptedRecord::try_from).collect()
}

#[async_trait]
impl LedgerStore for Database {
    /// Head read and insert run in one transaction; the unique index on
    /// `prev_hash` rejects a second child of the same entry.
    async fn append_entry(&self, entry: &AuditLogEntry) -> Result<(), LedgerError> {
        let mut tx = self.pool().begin().await?;

        let head: Option<String> = sqlx::query_scalar(
            "SELECT current_hash FROM access_logs ORDER BY seq DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let head_hash = head.as_deref().unwrap_or(GENESIS_HASH);
        if entry.prev_hash != head_hash {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM access_logs")
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Err(LedgerError::chain_broken(
                usize::try_from(count).unwrap_or_default(),
                "entry does not link to the durable chain head",
            ));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO access_logs
                (id, actor_id, subject_id, access_type, details, timestamp, timestamp_us, prev_hash, current_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.actor_id)
        .bind(&entry.subject_id)
        .bind(entry.action.as_str())
        .bind(&entry.details)
        .bind(entry.timestamp_text())
        .bind(entry.timestamp.timestamp_micros())
        .bind(&entry.prev_hash)
        .bind(&entry.current_hash)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            let fork = err
                .as_database_error()
                .map(|db_err| db_err.is_unique_violation())
                .unwrap_or(false);
            if fork {
                return Err(LedgerError::chain_broken(
                    0,
                    format!("append of {} rejected as a fork", entry.id),
                ));
            }
            return Err(err.into());
        }

        tx.commit().await?;
        Ok(())
    }

    async fn chain_head(&self) -> Result<Option<AuditLogEntry>, LedgerError> {
        let row: Option<AccessLogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM access_logs ORDER BY seq DESC LIMIT 1",
            ACCESS_LOG_COLUMNS
        ))
        .fetch_optional(self.pool())
        .await?;

        row.map(AuditLogEntry::try_from).transpose()
    }

    async fn query_recent(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        let rows: Vec<AccessLogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM access_logs WHERE subject_id = ? AND timestamp_us >= ? ORDER BY seq DESC",
            ACCESS_LOG_COLUMNS
        ))
        .bind(subject_id)
        .bind(since.timestamp_micros())
        .fetch_all(self.pool())
        .await?;

        into_entries(rows)
    }

    async fn recent_entries(&self, limit: usize) -> Result<Vec<AuditLogEntry>, LedgerError> {
        let rows: Vec<AccessLogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM access_logs ORDER BY seq DESC LIMIT ?",
            ACCESS_LOG_COLUMNS
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await?;

        into_entries(rows)
    }

    async fn all_entries(&self) -> Result<Vec<AuditLogEntry>, LedgerError> {
        let rows: Vec<AccessLogRow> = sqlx::query_as(&format!(
            "SELECT {} FROM access_logs ORDER BY seq ASC",
            ACCESS_LOG_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;

        into_entries(rows)
    }

    async fn put_record(&self, record: &EncryptedRecord) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO records (id, encrypted_data, last_seen_us)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                encrypted_data = excluded.encrypted_data,
                last_seen_us = excluded.last_seen_us
            "#,
        )
        .bind(&record.id)
        .bind(&record.ciphertext)
        .bind(record.last_seen.timestamp_micros())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn touch_record(&self, id: &str, last_seen: DateTime<Utc>) -> Result<bool, LedgerError> {
        let result = sqlx::query("UPDATE records SET last_seen_us = ? WHERE id = ?")
            .bind(last_seen.timestamp_micros())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_record(&self, id: &str) -> Result<Option<EncryptedRecord>, LedgerError> {
        let row: Option<RecordRow> =
            sqlx::query_as("SELECT id, encrypted_data, last_seen_us FROM records WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;

        row.map(EncryptedRecord::try_from).transpose()
    }

    async fn visible_records(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<EncryptedRecord>, LedgerError> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT id, encrypted_data, last_seen_us FROM records WHERE last_seen_us >= ? ORDER BY id",
        )
        .bind(since.timestamp_micros())
        .fetch_all(self.pool())
        .await?;

        into_records(rows)
    }

    async fn delete_record(&self, id: &str) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{verify_chain, AccessAction};
    use chrono::Duration;

    fn entry_after(head: Option<&AuditLogEntry>, subject: &str, actor: &str) -> AuditLogEntry {
        let prev = head
            .map(|e| e.current_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let ts = head
            .map(|e| e.timestamp + Duration::milliseconds(5))
            .unwrap_or_else(Utc::now);
        AuditLogEntry::with_fresh_id(
            ts,
            AccessAction::EmergencyDataRequest,
            "EMERGENCY_DATA_REQ".to_string(),
            prev,
            subject.to_string(),
            actor.to_string(),
        )
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(db.chain_head().await.unwrap().is_none());

        let a = entry_after(None, "P1", "D1");
        db.append_entry(&a).await.unwrap();
        let b = entry_after(Some(&a), "P2", "D2");
        db.append_entry(&b).await.unwrap();

        let head = db.chain_head().await.unwrap().unwrap();
        assert_eq!(head, b);

        let all = db.all_entries().await.unwrap();
        assert_eq!(all, vec![a.clone(), b.clone()]);
        assert!(verify_chain(&all).is_valid);

        let newest = db.recent_entries(1).await.unwrap();
        assert_eq!(newest, vec![b]);

        let about_p1 = db.query_recent("P1", a.timestamp).await.unwrap();
        assert_eq!(about_p1, vec![a]);
    }

    #[tokio::test]
    async fn test_rejects_stale_head() {
        let db = Database::new_in_memory().await.unwrap();
        let a = entry_after(None, "P1", "D1");
        db.append_entry(&a).await.unwrap();

        let stale = entry_after(None, "P1", "D2");
        let result = db.append_entry(&stale).await;
        assert!(matches!(result, Err(LedgerError::ChainIntegrity { index: 1, .. })));
        assert_eq!(db.all_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_rows_are_immutable() {
        let db = Database::new_in_memory().await.unwrap();
        let a = entry_after(None, "P1", "D1");
        db.append_entry(&a).await.unwrap();

        let update = sqlx::query("UPDATE access_logs SET details = 'edited'")
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM access_logs").execute(db.pool()).await;
        assert!(delete.is_err());
        assert_eq!(db.all_entries().await.unwrap(), vec![a]);
    }

    #[tokio::test]
    async fn test_record_lifecycle() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now();
        let record = EncryptedRecord {
            id: "P1".to_string(),
            ciphertext: "v1:AAAA".to_string(),
            last_seen: DateTime::<Utc>::from_timestamp_micros(now.timestamp_micros()).unwrap(),
        };

        db.put_record(&record).await.unwrap();
        assert_eq!(db.get_record("P1").await.unwrap(), Some(record.clone()));

        let window_start = now - Duration::minutes(5);
        assert_eq!(db.visible_records(window_start).await.unwrap().len(), 1);
        assert!(db
            .visible_records(now + Duration::seconds(1))
            .await
            .unwrap()
            .is_empty());

        let later = now + Duration::minutes(1);
        assert!(db.touch_record("P1", later).await.unwrap());
        assert!(!db.touch_record("P404", later).await.unwrap());

        assert!(db.delete_record("P1").await.unwrap());
        assert!(!db.delete_record("P1").await.unwrap());
        assert!(db.get_record("P1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_pool_reports_unavailable() {
        let db = Database::new_in_memory().await.unwrap();
        db.close().await;
        assert!(matches!(
            db.health_check().await,
            Err(LedgerError::PersistenceUnavailable(_))
        ));
    }
}
