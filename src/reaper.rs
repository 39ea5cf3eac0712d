//! Periodic purge of expired handoffs.
//!
//! `take` already refuses expired records, so the reaper only bounds storage
//! for codes nobody ever redeems.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::store::{Cleanup, HandoffStore};

/// One cleanup pass, logged.
pub fn sweep(store: &dyn HandoffStore) -> Result<Cleanup> {
    let cleanup = store.cleanup_expired()?;
    if cleanup.purged > 0 {
        tracing::info!(backend = %cleanup.backend, purged = cleanup.purged, "expired handoffs purged");
    } else {
        tracing::debug!(backend = %cleanup.backend, "no expired handoffs");
    }
    Ok(cleanup)
}

/// Background task running [`sweep`] on a fixed interval.
pub struct ExpiryReaper {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ExpiryReaper {
    /// Start sweeping `store` every `every`. The first sweep runs
    /// immediately. Must be called inside a tokio runtime; dropping the
    /// returned handle also stops the loop.
    pub fn spawn(store: Arc<dyn HandoffStore>, every: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop.changed() => break,
                }

                let store = Arc::clone(&store);
                match tokio::task::spawn_blocking(move || sweep(store.as_ref())).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "expiry sweep failed"),
                    Err(e) => tracing::warn!(error = %e, "expiry sweep task panicked"),
                }
            }

            tracing::debug!("expiry reaper stopped");
        });

        Self { handle, shutdown }
    }

    /// Stop the loop and wait for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeHasher;
    use crate::store::{MemoryStore, RetrievalMode};
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_reaper_purges_expired_records() {
        let store = Arc::new(MemoryStore::new(RetrievalMode::SingleUse));
        let hasher = CodeHasher::new("pepper");
        store
            .put(&hasher.hash_code("old"), json!(1), Utc::now() - chrono::Duration::seconds(5))
            .unwrap();
        store
            .put(&hasher.hash_code("new"), json!(2), Utc::now() + chrono::Duration::hours(1))
            .unwrap();

        let reaper = ExpiryReaper::spawn(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        reaper.shutdown().await;

        assert_eq!(store.len(), 1);
        assert!(store.peek(&hasher.hash_code("new")).is_some());
    }

    #[test]
    fn test_sweep_reports_count() {
        let store = MemoryStore::default();
        let hasher = CodeHasher::new("pepper");
        store
            .put(&hasher.hash_code("x"), json!(1), Utc::now() - chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(sweep(&store).unwrap().purged, 1);
    }
}
