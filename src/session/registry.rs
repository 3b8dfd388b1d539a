//! Session Registry
//!
//! Tracks which stored files are still in use. Every upload or edit starts
//! (or renews) a session keyed by file name; the [`Reaper`](super::Reaper)
//! deletes files whose session ran out.
//!
//! All reads and writes of the session map go through one async mutex, and
//! file deletion happens while that mutex is held, so a renewal can never
//! re-admit a key halfway through its reclamation.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::Instant;

use super::clock::{Clock, TokioClock};
use crate::storage::{FileStorage, StorageResult};

/// Number of reclaimed keys remembered for "gone" answers
const RECLAIMED_MEMORY: usize = 1024;

/// Longest session lifetime a single start or renewal can grant
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A live claim on a stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub key: String,
    pub started_at: Instant,
    pub expires_at: Instant,
    pub renewals: u32,
}

/// Result of a stale-orphan sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanSweep {
    /// Unregistered keys deleted by this sweep
    pub deleted: Vec<String>,
    /// Unregistered keys left because they are still within the grace period
    pub pending: usize,
}

// ============================================================================
// Session Registry
// ============================================================================

/// Shared handle to the session map
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: Mutex<HashMap<String, Session>>,
    storage: Arc<dyn FileStorage>,
    clock: Arc<dyn Clock>,
    /// Signalled whenever the nearest expiry may have changed
    wake: Notify,
    shutdown: watch::Sender<bool>,
    reclaimed: parking_lot::Mutex<LruCache<String, DateTime<Utc>>>,
}

impl SessionRegistry {
    /// Registry on tokio's clock
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self::with_clock(storage, Arc::new(TokioClock))
    }

    pub fn with_clock(storage: Arc<dyn FileStorage>, clock: Arc<dyn Clock>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let capacity = NonZeroUsize::new(RECLAIMED_MEMORY).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                storage,
                clock,
                wake: Notify::new(),
                shutdown,
                reclaimed: parking_lot::Mutex::new(LruCache::new(capacity)),
            }),
        }
    }

    pub fn storage(&self) -> &Arc<dyn FileStorage> {
        &self.inner.storage
    }

    pub fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Start a session or push an existing one's expiry to `now + ttl`.
    ///
    /// Returns the new expiry. `ttl` is capped at [`MAX_TTL`].
    pub async fn start_or_renew(&self, key: &str, ttl: Duration) -> Instant {
        let expires_at = {
            let mut sessions = self.inner.sessions.lock().await;
            self.upsert(&mut sessions, key, ttl)
        };

        self.inner.reclaimed.lock().pop(key);
        self.inner.wake.notify_one();
        expires_at
    }

    /// Like [`start_or_renew`](Self::start_or_renew), but only while the
    /// file is still in storage.
    ///
    /// The existence check and the renewal happen under the lock that
    /// reclamation holds, so a file is either renewed before it expires or
    /// already gone, never re-registered after its deletion.
    pub async fn renew_if_stored(&self, key: &str, ttl: Duration) -> Option<Instant> {
        let expires_at = {
            let mut sessions = self.inner.sessions.lock().await;
            if !self.inner.storage.exists(key).await {
                return None;
            }
            self.upsert(&mut sessions, key, ttl)
        };

        self.inner.reclaimed.lock().pop(key);
        self.inner.wake.notify_one();
        Some(expires_at)
    }

    fn upsert(&self, sessions: &mut HashMap<String, Session>, key: &str, ttl: Duration) -> Instant {
        let ttl = ttl.min(MAX_TTL);
        let now = self.now();
        let expires_at = now.checked_add(ttl).unwrap_or(now);

        match sessions.get_mut(key) {
            Some(session) => {
                session.expires_at = expires_at;
                session.renewals += 1;
                tracing::debug!(
                    key = %key,
                    ttl_secs = ttl.as_secs(),
                    renewals = session.renewals,
                    "Renewed session"
                );
            }
            None => {
                sessions.insert(
                    key.to_string(),
                    Session {
                        key: key.to_string(),
                        started_at: now,
                        expires_at,
                        renewals: 0,
                    },
                );
                tracing::info!(key = %key, ttl_secs = ttl.as_secs(), "Started session");
            }
        }
        expires_at
    }

    /// End a session. Returns false when there was none.
    pub async fn end(&self, key: &str) -> bool {
        let removed = self.inner.sessions.lock().await.remove(key).is_some();
        if removed {
            tracing::info!(key = %key, "Ended session");
            self.inner.wake.notify_one();
        }
        removed
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.sessions.lock().await.contains_key(key)
    }

    pub async fn get(&self, key: &str) -> Option<Session> {
        self.inner.sessions.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.sessions.lock().await.is_empty()
    }

    /// Earliest expiry among live sessions
    pub async fn next_expiry(&self) -> Option<Instant> {
        self.inner
            .sessions
            .lock()
            .await
            .values()
            .map(|s| s.expires_at)
            .min()
    }

    /// Whether `key` was reclaimed by expiry and not started again since
    pub fn was_reclaimed(&self, key: &str) -> bool {
        self.inner.reclaimed.lock().contains(key)
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Remove every expired session and delete its file.
    ///
    /// Returns the reclaimed keys.
    pub async fn reclaim_expired(&self) -> Vec<String> {
        let mut sessions = self.inner.sessions.lock().await;
        let now = self.now();

        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.expires_at <= now)
            .map(|s| s.key.clone())
            .collect();

        for key in &expired {
            sessions.remove(key);
            match self.inner.storage.delete(key).await {
                Ok(true) => tracing::info!(key = %key, "Reclaimed expired file"),
                Ok(false) => tracing::debug!(key = %key, "Expired file already gone"),
                Err(e) => tracing::warn!(key = %key, error = %e, "Failed to delete expired file"),
            }
            self.inner.reclaimed.lock().put(key.clone(), Utc::now());
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), remaining = sessions.len(), "Reclaimed expired sessions");
        }
        expired
    }

    /// Delete every stored file without a live session.
    ///
    /// Returns the deleted keys.
    pub async fn force_cleanup(&self) -> StorageResult<Vec<String>> {
        let sessions = self.inner.sessions.lock().await;
        let mut deleted = Vec::new();

        for key in self.inner.storage.list_keys().await? {
            if sessions.contains_key(&key) {
                continue;
            }
            match self.inner.storage.delete(&key).await {
                Ok(_) => deleted.push(key),
                Err(e) => tracing::warn!(key = %key, error = %e, "Failed to delete orphaned file"),
            }
        }

        tracing::info!(deleted = deleted.len(), kept = sessions.len(), "Forced cleanup");
        Ok(deleted)
    }

    /// Delete unregistered files last modified more than `grace` ago
    pub async fn sweep_orphans(&self, grace: Duration) -> StorageResult<OrphanSweep> {
        let sessions = self.inner.sessions.lock().await;
        // No cutoff when the grace period is out of range: nothing is stale
        let cutoff = chrono::Duration::from_std(grace)
            .ok()
            .and_then(|grace| Utc::now().checked_sub_signed(grace));
        let mut sweep = OrphanSweep::default();

        for key in self.inner.storage.list_keys().await? {
            if sessions.contains_key(&key) {
                continue;
            }
            let modified = match self.inner.storage.modified_time(&key).await {
                Ok(modified) => modified,
                // Deleted since listing
                Err(_) => continue,
            };
            if cutoff.map_or(false, |cutoff| modified <= cutoff) {
                match self.inner.storage.delete(&key).await {
                    Ok(_) => {
                        tracing::info!(key = %key, "Deleted stale orphan");
                        sweep.deleted.push(key);
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Failed to delete stale orphan");
                        sweep.pending += 1;
                    }
                }
            } else {
                sweep.pending += 1;
            }
        }

        Ok(sweep)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Signal the reaper to stop. Sessions and files are left in place.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        self.inner.wake.notify_waiters();
        tracing::info!("Session registry shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    /// Resolves after the next start, renewal or end
    pub(crate) async fn changed(&self) {
        self.inner.wake.notified().await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ManualClock;
    use crate::storage::MemoryStorage;

    const TWO_MINUTES: Duration = Duration::from_secs(120);

    fn registry() -> (SessionRegistry, Arc<MemoryStorage>, Arc<ManualClock>) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new());
        let registry = SessionRegistry::with_clock(storage.clone(), clock.clone());
        (registry, storage, clock)
    }

    #[tokio::test]
    async fn test_renew_keeps_single_entry() {
        let (registry, _, clock) = registry();

        let first = registry.start_or_renew("a.pdf", TWO_MINUTES).await;
        clock.advance(Duration::from_secs(30));
        let second = registry.start_or_renew("a.pdf", TWO_MINUTES).await;

        assert!(second > first);
        assert_eq!(registry.len().await, 1);
        let session = registry.get("a.pdf").await.unwrap();
        assert_eq!(session.expires_at, second);
        assert_eq!(session.renewals, 1);
    }

    #[tokio::test]
    async fn test_end_is_silent_when_absent() {
        let (registry, _, _) = registry();
        registry.start_or_renew("a.pdf", TWO_MINUTES).await;

        assert!(registry.end("a.pdf").await);
        assert!(!registry.end("a.pdf").await);
        assert!(!registry.contains("a.pdf").await);
    }

    #[tokio::test]
    async fn test_reclaim_expired_with_fake_clock() {
        let (registry, storage, clock) = registry();
        storage.write("a.pdf", b"a").await.unwrap();
        storage.write("b.pdf", b"b").await.unwrap();

        registry.start_or_renew("a.pdf", Duration::from_secs(1)).await;
        registry.start_or_renew("b.pdf", Duration::from_secs(600)).await;

        assert!(registry.reclaim_expired().await.is_empty());

        clock.advance(Duration::from_secs(2));
        assert_eq!(registry.reclaim_expired().await, vec!["a.pdf".to_string()]);

        assert!(!registry.contains("a.pdf").await);
        assert!(!storage.exists("a.pdf").await);
        assert!(registry.contains("b.pdf").await);
        assert!(storage.exists("b.pdf").await);
        assert!(registry.was_reclaimed("a.pdf"));
        assert!(!registry.was_reclaimed("b.pdf"));
    }

    #[tokio::test]
    async fn test_reclaim_tolerates_missing_file() {
        let (registry, _, clock) = registry();
        registry.start_or_renew("ghost.pdf", Duration::from_secs(1)).await;
        clock.advance(Duration::from_secs(1));

        assert_eq!(registry.reclaim_expired().await, vec!["ghost.pdf".to_string()]);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_restart_clears_reclaimed_mark() {
        let (registry, _, clock) = registry();
        registry.start_or_renew("a.pdf", Duration::from_secs(1)).await;
        clock.advance(Duration::from_secs(1));
        registry.reclaim_expired().await;
        assert!(registry.was_reclaimed("a.pdf"));

        registry.start_or_renew("a.pdf", TWO_MINUTES).await;
        assert!(!registry.was_reclaimed("a.pdf"));
    }

    #[tokio::test]
    async fn test_force_cleanup_keeps_registered() {
        let (registry, storage, _) = registry();
        storage.write("a.pdf", b"a").await.unwrap();
        storage.write("b.pdf", b"b").await.unwrap();
        registry.start_or_renew("b.pdf", TWO_MINUTES).await;

        let deleted = registry.force_cleanup().await.unwrap();

        assert_eq!(deleted, vec!["a.pdf".to_string()]);
        assert!(!storage.exists("a.pdf").await);
        assert!(storage.exists("b.pdf").await);
    }

    #[tokio::test]
    async fn test_sweep_orphans_respects_grace() {
        let (registry, storage, _) = registry();
        for key in ["old.pdf", "fresh.pdf", "live.pdf"] {
            storage.write(key, b"x").await.unwrap();
        }
        let long_ago = Utc::now() - chrono::Duration::minutes(10);
        storage.set_modified("old.pdf", long_ago).unwrap();
        storage.set_modified("live.pdf", long_ago).unwrap();
        registry.start_or_renew("live.pdf", TWO_MINUTES).await;

        let sweep = registry.sweep_orphans(TWO_MINUTES).await.unwrap();

        assert_eq!(sweep.deleted, vec!["old.pdf".to_string()]);
        assert_eq!(sweep.pending, 1);
        assert!(storage.exists("fresh.pdf").await);
        assert!(storage.exists("live.pdf").await);
    }

    #[tokio::test]
    async fn test_next_expiry_is_minimum() {
        let (registry, _, _) = registry();
        assert!(registry.next_expiry().await.is_none());

        registry.start_or_renew("late.pdf", Duration::from_secs(600)).await;
        let early = registry.start_or_renew("early.pdf", Duration::from_secs(5)).await;
        assert_eq!(registry.next_expiry().await, Some(early));
    }

    #[tokio::test]
    async fn test_huge_ttl_is_capped() {
        let (registry, _, clock) = registry();
        let now = clock.now();

        let expires_at = registry.start_or_renew("a.pdf", Duration::MAX).await;

        assert_eq!(expires_at, now + MAX_TTL);
        assert!(registry.reclaim_expired().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_renew_and_reclaim_agree() {
        for round in 0..50 {
            let (registry, storage, clock) = registry();
            let key = format!("race-{}.pdf", round);
            storage.write(&key, b"%PDF").await.unwrap();
            registry.start_or_renew(&key, Duration::from_secs(1)).await;
            clock.advance(Duration::from_secs(2));

            let renewer = {
                let registry = registry.clone();
                let key = key.clone();
                tokio::spawn(async move { registry.renew_if_stored(&key, TWO_MINUTES).await })
            };
            let reaper = {
                let registry = registry.clone();
                tokio::spawn(async move { registry.reclaim_expired().await })
            };
            let renewed = renewer.await.unwrap();
            let reclaimed = reaper.await.unwrap();

            // Exactly one side wins, and the registry matches storage either way
            assert_ne!(renewed.is_some(), !reclaimed.is_empty(), "round {}", round);
            assert_eq!(
                registry.contains(&key).await,
                storage.exists(&key).await,
                "round {}",
                round
            );
        }
    }

    #[tokio::test]
    async fn test_renew_if_stored_skips_missing_file() {
        let (registry, storage, _) = registry();
        assert!(registry.renew_if_stored("none.pdf", TWO_MINUTES).await.is_none());
        assert!(!registry.contains("none.pdf").await);

        storage.write("a.pdf", b"a").await.unwrap();
        assert!(registry.renew_if_stored("a.pdf", TWO_MINUTES).await.is_some());
        assert!(registry.contains("a.pdf").await);
    }
}
