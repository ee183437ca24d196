//! Shutdown Orchestrator
//!
//! Stops a running server in a fixed order:
//!
//! ```text
//! Running ──stop()──> Draining ─────────────────────────────────────> Stopped
//!                        │ 1. set stop flag, wait for the acceptor to close the listener
//!                        │ 2. if any session is Active, warn and wait the full drain timeout
//!                        │ 3. force-close whatever is still registered
//!                        │ 4. stop the reclaimer
//!                        │ 5. save the snapshot (failures are logged, not returned)
//! ```
//!
//! The drain wait is never cut short, even if every client leaves early.

use crate::connection::{ConnectionStats, SessionRegistry};
use crate::protocol::{format_duration, Reply};
use crate::storage::{snapshot, Reclaimer, Store};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

/// Upper bound on waiting for session tasks after the forced close.
const SESSION_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// What happened during a `stop()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Sessions that received the drain warning
    pub warned_sessions: usize,
    /// Sessions still connected after the drain timeout
    pub forced_sessions: usize,
    /// Live entries written to the snapshot
    pub saved_entries: usize,
    /// Whether the snapshot was written
    pub snapshot_saved: bool,
}

/// Handle to a running server; stopping it goes through [`ShutdownOrchestrator::stop`].
#[derive(Debug)]
pub struct ShutdownOrchestrator {
    state: ShutdownState,
    local_addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    acceptor: Option<JoinHandle<JoinSet<()>>>,
    store: Arc<Store>,
    registry: Arc<SessionRegistry>,
    stats: Arc<ConnectionStats>,
    reclaimer: Reclaimer,
    drain_timeout: Duration,
    snapshot_path: PathBuf,
}

impl ShutdownOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        local_addr: SocketAddr,
        stop_tx: watch::Sender<bool>,
        acceptor: JoinHandle<JoinSet<()>>,
        store: Arc<Store>,
        registry: Arc<SessionRegistry>,
        stats: Arc<ConnectionStats>,
        reclaimer: Reclaimer,
        drain_timeout: Duration,
        snapshot_path: PathBuf,
    ) -> Self {
        Self {
            state: ShutdownState::Running,
            local_addr,
            stop_tx,
            acceptor: Some(acceptor),
            store,
            registry,
            stats,
            reclaimer,
            drain_timeout,
            snapshot_path,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Runs the shutdown sequence.
    ///
    /// Only the first call does anything; later calls return an empty summary.
    pub async fn stop(&mut self) -> ShutdownSummary {
        if self.state != ShutdownState::Running {
            return ShutdownSummary::default();
        }

        info!("Stopping the MemoryDB server");
        self.state = ShutdownState::Draining;
        let mut summary = ShutdownSummary::default();

        // 1. Stop accepting
        self.stop_tx.send_replace(true);
        let mut sessions = match self.acceptor.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                error!(error = %e, "Acceptor task failed");
                JoinSet::new()
            }),
            None => JoinSet::new(),
        };

        // 2. Warn and wait out the drain timeout
        if self.registry.active_count() > 0 {
            let warning = Reply::new(format!(
                "Host wants to drop down the server in: {}",
                format_duration(self.drain_timeout)
            ));
            summary.warned_sessions = self.registry.broadcast(&warning).await;
            info!(
                sessions = summary.warned_sessions,
                timeout = %format_duration(self.drain_timeout),
                "Warned clients, draining"
            );
            tokio::time::sleep(self.drain_timeout).await;
        }

        // 3. Force-close the rest
        summary.forced_sessions = self.registry.close_all().await;
        if summary.forced_sessions > 0 {
            info!(sessions = summary.forced_sessions, "Closing all connections");
        }
        let joined = tokio::time::timeout(SESSION_JOIN_TIMEOUT, async {
            while let Some(result) = sessions.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Session task ended abnormally");
                }
            }
        })
        .await;
        if joined.is_err() {
            warn!(sessions = sessions.len(), "Sessions did not exit in time, aborting them");
            sessions.shutdown().await;
        }

        // 4. Stop background reclamation
        self.reclaimer.stop().await;

        // 5. Persist
        info!("Saving in-memory db records...");
        let snapshot = self.store.snapshot();
        summary.saved_entries = snapshot.len();
        match snapshot::save(&self.snapshot_path, &snapshot).await {
            Ok(()) => summary.snapshot_saved = true,
            Err(e) => error!(
                path = %self.snapshot_path.display(),
                error = %e,
                "Couldn't save snapshot, continuing shutdown"
            ),
        }

        self.state = ShutdownState::Stopped;
        info!(
            accepted = self.stats.connections_accepted.load(Ordering::Relaxed),
            rejected = self.stats.connections_rejected.load(Ordering::Relaxed),
            commands = self.stats.commands_processed.load(Ordering::Relaxed),
            "MemoryDB server is stopped"
        );
        summary
    }
}
