//! Background Reclaimer
//!
//! Reads never delete expired entries (lazy expiry), so an entry that expires
//! and is never touched again would stay in memory until something removes it.
//! The reclaimer is a Tokio task that calls [`Store::sweep`] on a fixed interval.
//!
//! ## Lifecycle
//!
//! The reclaimer is owned by the server. It is started once, when the store is
//! built, and stopped explicitly with [`Reclaimer::stop`] during shutdown. A zero
//! interval disables it entirely.

use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Handle to the periodic sweep task.
#[derive(Debug)]
pub struct Reclaimer {
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Reclaimer {
    /// Starts sweeping `store` every `interval`.
    ///
    /// With a zero interval no task is spawned and the returned handle is idle.
    pub fn start(store: Arc<Store>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = if interval.is_zero() {
            debug!("Reclaimer disabled (zero interval)");
            None
        } else {
            info!(interval_secs = interval.as_secs(), "Background reclaimer started");
            Some(tokio::spawn(reclaimer_loop(store, interval, shutdown_rx)))
        };

        Self {
            interval,
            shutdown_tx,
            task,
        }
    }

    /// The configured sweep interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true while the sweep task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signals the sweep task to stop and waits for it to finish.
    ///
    /// Calling this more than once is harmless.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        let _ = self.shutdown_tx.send(true);
        if let Err(e) = task.await {
            // A panic in the sweep is a bug; let it surface
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
        }
        info!("Background reclaimer stopped");
    }
}

async fn reclaimer_loop(store: Arc<Store>, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Reclaimer received shutdown signal");
                    return;
                }
            }
        }

        let removed = store.sweep();
        if removed > 0 {
            debug!(removed, remaining = store.len(), "Expired entries reclaimed");
        } else {
            trace!("Sweep found no expired entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Ttl;

    #[tokio::test]
    async fn test_reclaimer_sweeps_expired_entries() {
        let store = Arc::new(Store::default());

        for i in 0..10 {
            store
                .set(&format!("key{i}"), "value", Ttl::After(Duration::from_millis(20)))
                .unwrap();
        }
        store.set("persistent", "value", Ttl::Never).unwrap();
        assert_eq!(store.len(), 11);

        let mut reclaimer = Reclaimer::start(Arc::clone(&store), Duration::from_millis(10));
        assert!(reclaimer.is_running());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("persistent"), Some("value".to_string()));

        reclaimer.stop().await;
        assert!(!reclaimer.is_running());
    }

    #[tokio::test]
    async fn test_stopped_reclaimer_leaves_entries() {
        let store = Arc::new(Store::default());

        let mut reclaimer = Reclaimer::start(Arc::clone(&store), Duration::from_millis(10));
        reclaimer.stop().await;

        store
            .set("key", "value", Ttl::After(Duration::from_millis(5)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Nothing swept it, but reads still see it as expired
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("key"), None);
    }

    #[tokio::test]
    async fn test_zero_interval_is_disabled() {
        let store = Arc::new(Store::default());

        let mut reclaimer = Reclaimer::start(store, Duration::ZERO);
        assert_eq!(reclaimer.interval(), Duration::ZERO);
        assert!(!reclaimer.is_running());
        reclaimer.stop().await;
    }
}
