//! Reaper
//!
//! One long-lived task that deletes files whose session expired. It sleeps
//! until the nearest expiry, bounded by the wake granularity, and suspends
//! entirely while there is nothing to watch. Any start, renewal or end
//! re-arms it; the registry's shutdown signal stops it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::registry::SessionRegistry;

/// Shortest allowed sleep between passes
const MIN_GRANULARITY: Duration = Duration::from_millis(10);

/// Background reclamation loop
pub struct Reaper {
    registry: SessionRegistry,
    granularity: Duration,
    orphan_grace: Option<Duration>,
}

impl Reaper {
    /// `granularity` bounds every sleep while something is being watched.
    /// It is raised to a small minimum so a zero value cannot spin.
    pub fn new(registry: SessionRegistry, granularity: Duration) -> Self {
        Self {
            registry,
            granularity: granularity.max(MIN_GRANULARITY),
            orphan_grace: None,
        }
    }

    /// Also delete unregistered files older than `grace` on every wake
    pub fn with_orphan_grace(mut self, grace: Duration) -> Self {
        self.orphan_grace = Some(grace);
        self
    }

    /// Start the loop on the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut shutdown = self.registry.subscribe_shutdown();
        tracing::info!(
            granularity_secs = self.granularity.as_secs(),
            orphan_grace_secs = self.orphan_grace.map(|g| g.as_secs()),
            "Reaper started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let pending_orphans = self.sweep().await;

            match self.next_wake(pending_orphans).await {
                Some(deadline) => {
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = self.registry.changed() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => {
                    tracing::debug!("Nothing to watch, reaper suspended");
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = self.registry.changed() => {}
                    }
                }
            }
        }

        tracing::info!("Reaper stopped");
    }

    /// One reclamation pass. Returns the number of orphans still waiting
    /// out their grace period.
    async fn sweep(&self) -> usize {
        self.registry.reclaim_expired().await;

        let Some(grace) = self.orphan_grace else {
            return 0;
        };
        match self.registry.sweep_orphans(grace).await {
            Ok(sweep) => sweep.pending,
            Err(e) => {
                tracing::warn!(error = %e, "Orphan sweep failed");
                0
            }
        }
    }

    async fn next_wake(&self, pending_orphans: usize) -> Option<Instant> {
        // An unrepresentable deadline means the granularity never fires
        let idle_deadline = self.registry.now().checked_add(self.granularity);
        match (self.registry.next_expiry().await, idle_deadline) {
            (Some(expiry), Some(idle)) => Some(expiry.min(idle)),
            (Some(expiry), None) => Some(expiry),
            (None, idle) if pending_orphans > 0 => idle,
            (None, _) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};

    const GRANULARITY: Duration = Duration::from_secs(60);

    async fn setup(keys: &[&str]) -> (SessionRegistry, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        for key in keys {
            storage.write(key, b"%PDF").await.unwrap();
        }
        (SessionRegistry::new(storage.clone()), storage)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaims_only_expired() {
        let (registry, storage) = setup(&["a.pdf", "b.pdf"]).await;
        registry.start_or_renew("a.pdf", Duration::from_secs(1)).await;
        registry.start_or_renew("b.pdf", Duration::from_secs(600)).await;

        let handle = Reaper::new(registry.clone(), GRANULARITY).spawn();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!registry.contains("a.pdf").await);
        assert!(!storage.exists("a.pdf").await);
        assert!(registry.contains("b.pdf").await);
        assert!(storage.exists("b.pdf").await);

        registry.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_postpones_reclamation() {
        let (registry, storage) = setup(&["a.pdf"]).await;
        registry.start_or_renew("a.pdf", Duration::from_secs(10)).await;
        let handle = Reaper::new(registry.clone(), GRANULARITY).spawn();

        tokio::time::sleep(Duration::from_secs(8)).await;
        registry.start_or_renew("a.pdf", Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(storage.exists("a.pdf").await);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!storage.exists("a.pdf").await);

        registry.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_reaper_is_rearmed() {
        let (registry, storage) = setup(&["late.pdf"]).await;
        let handle = Reaper::new(registry.clone(), GRANULARITY).spawn();

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!handle.is_finished());

        registry.start_or_renew("late.pdf", Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!storage.exists("late.pdf").await);
        assert!(registry.was_reclaimed("late.pdf"));

        registry.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop() {
        let (registry, _) = setup(&[]).await;
        registry.start_or_renew("a.pdf", Duration::from_secs(600)).await;
        let handle = Reaper::new(registry.clone(), GRANULARITY).spawn();
        tokio::task::yield_now().await;

        registry.shutdown();
        let stopped = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(stopped.is_ok());
        assert!(registry.is_shut_down());
        // Shutdown leaves sessions alone
        assert!(registry.contains("a.pdf").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_orphans_swept() {
        let (registry, storage) = setup(&["orphan.pdf", "recent.pdf", "live.pdf"]).await;
        let long_ago = Utc::now() - chrono::Duration::minutes(10);
        storage.set_modified("orphan.pdf", long_ago).unwrap();
        registry.start_or_renew("live.pdf", Duration::from_secs(600)).await;

        let handle = Reaper::new(registry.clone(), GRANULARITY)
            .with_orphan_grace(Duration::from_secs(120))
            .spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!storage.exists("orphan.pdf").await);
        assert!(storage.exists("recent.pdf").await);
        assert!(storage.exists("live.pdf").await);

        registry.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_granularity_does_not_spin() {
        let (registry, storage) = setup(&["a.pdf"]).await;
        registry.start_or_renew("a.pdf", Duration::from_secs(5)).await;

        let reaper = Reaper::new(registry.clone(), Duration::ZERO);
        assert_eq!(reaper.granularity, MIN_GRANULARITY);
        let handle = reaper.spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(storage.exists("a.pdf").await);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!storage.exists("a.pdf").await);

        registry.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_granularity_still_reclaims() {
        let (registry, storage) = setup(&["a.pdf"]).await;
        registry.start_or_renew("a.pdf", Duration::from_secs(1)).await;

        let handle = Reaper::new(registry.clone(), Duration::MAX).spawn();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!storage.exists("a.pdf").await);

        registry.shutdown();
        handle.await.unwrap();
    }
}
