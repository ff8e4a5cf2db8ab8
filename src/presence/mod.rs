//! Presence Directory
//!
//! Tracks when each record identity was last seen. An identity is visible
//! while `now - last_seen <= window`; hiding removes it at once. Access
//! notifications use their own, shorter window over the ledger.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::audit::AuditLogEntry;
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::storage::{EncryptedRecord, PersistenceAdapter, StoreSource};

pub struct PresenceDirectory {
    adapter: Arc<PersistenceAdapter>,
    clock: Arc<dyn Clock>,
    /// Entries older than this are dropped on the next write
    retention: Duration,
    last_seen: RwLock<HashMap<String, DateTime<Utc>>>,
    identity_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PresenceDirectory {
    pub fn new(adapter: Arc<PersistenceAdapter>, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            adapter,
            clock,
            retention,
            last_seen: RwLock::new(HashMap::new()),
            identity_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Lock serializing one identity's record write and heartbeat
    async fn identity_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.identity_locks
            .lock()
            .await
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Give back an identity lock, dropping the map entry if nobody else holds it
    ///
    /// Clones are only taken under the map lock, so a count of one here means
    /// no caller is waiting on this identity.
    async fn release_identity(&self, id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.identity_locks.lock().await;
        drop(lock);
        if locks.get(id).map_or(false, |held| Arc::strong_count(held) == 1) {
            locks.remove(id);
        }
    }

    /// Number of identities with a live lock entry
    pub async fn tracked_locks(&self) -> usize {
        self.identity_locks.lock().await.len()
    }

    /// Number of identities in the presence map
    pub async fn tracked_identities(&self) -> usize {
        self.last_seen.read().await.len()
    }

    async fn mark_seen(&self, id: &str, last_seen: DateTime<Utc>) {
        let now = self.clock.now();
        let mut seen = self.last_seen.write().await;
        seen.insert(id.to_string(), last_seen);
        let before = seen.len();
        seen.retain(|_, at| now - *at <= self.retention);
        if seen.len() < before {
            debug!("Pruned {} stale presence entries", before - seen.len());
        }
    }

    pub async fn heartbeat(&self, id: &str) -> Result<bool, LedgerError> {
        self.heartbeat_at(id, self.clock.now()).await
    }

    /// Refresh `id` as seen at `last_seen`
    ///
    /// Only identities with a stored record are tracked; returns whether one
    /// was refreshed.
    pub async fn heartbeat_at(
        &self,
        id: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let lock = self.identity_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            self.refresh(id, last_seen).await
        };
        self.release_identity(id, lock).await;
        result
    }

    async fn refresh(&self, id: &str, last_seen: DateTime<Utc>) -> Result<bool, LedgerError> {
        let touched = self.adapter.touch_record(id, last_seen).await?;
        if touched.value {
            self.mark_seen(id, last_seen).await;
        }
        debug!("Heartbeat for {} (record stored: {})", id, touched.value);
        Ok(touched.value)
    }

    /// Store a new ciphertext for `id` and mark it seen now
    pub async fn publish(&self, id: &str, ciphertext: String) -> Result<StoreSource, LedgerError> {
        let lock = self.identity_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            let now = self.clock.now();
            let record = EncryptedRecord {
                id: id.to_string(),
                ciphertext,
                last_seen: now,
            };
            match self.adapter.put_record(&record).await {
                Ok(source) => {
                    self.mark_seen(id, now).await;
                    Ok(source)
                }
                Err(err) => Err(err),
            }
        };
        self.release_identity(id, lock).await;
        result
    }

    /// Remove `id` from the directory and delete its record
    pub async fn hide(&self, id: &str) -> Result<bool, LedgerError> {
        let lock = self.identity_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            let was_present = self.last_seen.write().await.remove(id).is_some();
            self.adapter
                .delete_record(id)
                .await
                .map(|deleted| deleted || was_present)
        };
        self.release_identity(id, lock).await;
        debug!("Hid {}", id);
        result
    }

    pub async fn is_visible(&self, id: &str, window: Duration) -> bool {
        let now = self.clock.now();
        self.last_seen
            .read()
            .await
            .get(id)
            .map(|seen| now - *seen <= window)
            .unwrap_or(false)
    }

    /// Identities seen within `window`, sorted
    ///
    /// Includes records persisted by an earlier process that have not sent a
    /// heartbeat to this one yet.
    pub async fn list_visible(&self, window: Duration) -> Result<Vec<String>, LedgerError> {
        let now = self.clock.now();
        let mut ids: BTreeSet<String> = self
            .last_seen
            .read()
            .await
            .iter()
            .filter(|(_, seen)| now - **seen <= window)
            .map(|(id, _)| id.clone())
            .collect();

        for record in self.visible_records(window).await? {
            ids.insert(record.id);
        }
        Ok(ids.into_iter().collect())
    }

    /// Stored records seen within `window`, sorted by id
    pub async fn visible_records(
        &self,
        window: Duration,
    ) -> Result<Vec<EncryptedRecord>, LedgerError> {
        let since = self.clock.now() - window;
        Ok(self.adapter.visible_records(since).await?.value)
    }

    /// Accesses to `subject_id` within `window`, newest first
    pub async fn recent_access(
        &self,
        subject_id: &str,
        window: Duration,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        let since = self.clock.now() - window;
        self.adapter.query_recent(subject_id, since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AccessAction, LedgerChain};
    use crate::clock::ManualClock;
    use crate::storage::{CircuitBreaker, MemoryStore};

    fn setup() -> (PresenceDirectory, LedgerChain, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let adapter = Arc::new(PersistenceAdapter::new(
            Arc::new(MemoryStore::new(64)),
            Arc::new(MemoryStore::new(64)),
            CircuitBreaker::new(3, Duration::seconds(30), clock.clone()),
        ));
        let presence = PresenceDirectory::new(adapter.clone(), clock.clone(), Duration::seconds(300));
        let chain = LedgerChain::new(adapter, clock.clone());
        (presence, chain, clock)
    }

    #[tokio::test]
    async fn test_visibility_window() {
        let (presence, _, clock) = setup();
        let window = Duration::seconds(300);

        presence.publish("P1", "v1:AAAA".to_string()).await.unwrap();
        assert!(presence.heartbeat("P1").await.unwrap());
        assert_eq!(presence.list_visible(window).await.unwrap(), vec!["P1"]);

        // boundary is inclusive
        clock.advance(Duration::seconds(300));
        assert!(presence.is_visible("P1", window).await);

        clock.advance(Duration::seconds(1));
        assert!(presence.list_visible(window).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hide_is_immediate() {
        let (presence, _, _) = setup();
        presence.publish("P1", "v1:AAAA".to_string()).await.unwrap();
        assert!(presence.hide("P1").await.unwrap());
        assert!(presence
            .list_visible(Duration::seconds(300))
            .await
            .unwrap()
            .is_empty());
        assert!(presence
            .visible_records(Duration::seconds(300))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_stored_record() {
        let (presence, _, clock) = setup();
        presence.publish("P1", "v1:AAAA".to_string()).await.unwrap();

        clock.advance(Duration::seconds(200));
        presence.heartbeat("P1").await.unwrap();
        clock.advance(Duration::seconds(200));

        let records = presence.visible_records(Duration::seconds(300)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ciphertext, "v1:AAAA");
    }

    #[tokio::test]
    async fn test_recent_access_outlives_visibility() {
        let (presence, chain, clock) = setup();
        presence.publish("P1", "v1:AAAA".to_string()).await.unwrap();

        clock.advance(Duration::seconds(301));
        chain
            .append("D1", "P1", AccessAction::EmergencyDataRequest, "EMERGENCY_DATA_REQ")
            .await
            .unwrap();
        clock.advance(Duration::seconds(10));

        assert!(presence
            .list_visible(Duration::seconds(300))
            .await
            .unwrap()
            .is_empty());
        let recent = presence
            .recent_access("P1", Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].actor_id, "D1");

        clock.advance(Duration::seconds(30));
        assert!(presence
            .recent_access("P1", Duration::seconds(30))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_without_record_leaves_no_state() {
        let (presence, _, _) = setup();
        for n in 0..50 {
            assert!(!presence.heartbeat(&format!("ghost-{}", n)).await.unwrap());
        }
        assert_eq!(presence.tracked_identities().await, 0);
        assert_eq!(presence.tracked_locks().await, 0);
    }

    #[tokio::test]
    async fn test_stale_presence_is_pruned() {
        let (presence, _, clock) = setup();
        presence.publish("P1", "v1:AAAA".to_string()).await.unwrap();
        presence.publish("P2", "v1:BBBB".to_string()).await.unwrap();
        assert_eq!(presence.tracked_identities().await, 2);

        clock.advance(Duration::seconds(301));
        presence.publish("P3", "v1:CCCC".to_string()).await.unwrap();
        assert_eq!(presence.tracked_identities().await, 1);
        assert!(presence.is_visible("P3", Duration::seconds(300)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_hide_keeps_identity_serialized() {
        let (presence, _, _) = setup();
        let presence = Arc::new(presence);
        presence.publish("P1", "v1:AAAA".to_string()).await.unwrap();

        // a caller holding the identity lock keeps its map entry alive across a hide
        let held = presence.identity_lock("P1").await;
        let guard = held.clone().lock_owned().await;
        let hide = {
            let presence = presence.clone();
            tokio::spawn(async move { presence.hide("P1").await })
        };
        drop(guard);
        assert!(hide.await.unwrap().unwrap());

        let after = presence.identity_lock("P1").await;
        assert!(Arc::ptr_eq(&held, &after));
        presence.release_identity("P1", after).await;
        presence.release_identity("P1", held).await;
        assert_eq!(presence.tracked_locks().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_release_locks() {
        let (presence, _, _) = setup();
        let presence = Arc::new(presence);

        let mut tasks = Vec::new();
        for n in 0..16 {
            let presence = presence.clone();
            tasks.push(tokio::spawn(async move {
                let id = format!("P{}", n % 4);
                presence.publish(&id, "v1:AAAA".to_string()).await?;
                presence.heartbeat(&id).await?;
                presence.hide(&id).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(presence.tracked_locks().await, 0);
    }
}
