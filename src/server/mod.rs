//! Server Module
//!
//! Wires the store, the reclaimer, the session registry and the acceptor
//! together, and hands back a [`ShutdownOrchestrator`] to stop them.
//!
//! ## Startup
//!
//! ```text
//! Server::bind(config)
//!   ├─ build the store (empty, or restored from the snapshot if configured)
//!   ├─ bind the listener            (failure is fatal: ServerError::Bind)
//!   └─ start the reclaimer
//! Server::start()
//!   └─ spawn the acceptor           ─> ShutdownOrchestrator
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use memorydb::{Config, Server};
//!
//! # async fn run() -> Result<(), memorydb::ServerError> {
//! let server = Server::bind(Config::default()).await?;
//! let mut running = server.start();
//!
//! tokio::signal::ctrl_c().await.ok();
//! running.stop().await;
//! # Ok(())
//! # }
//! ```

mod acceptor;
pub mod shutdown;

pub use acceptor::{SERVER_FULL_MESSAGE, WELCOME_MESSAGE};
pub use shutdown::{ShutdownOrchestrator, ShutdownState, ShutdownSummary};

use crate::config::Config;
use crate::connection::{ConnectionStats, SessionRegistry};
use crate::storage::{snapshot, Reclaimer, Store};
use acceptor::Acceptor;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// A bound, not yet accepting, server.
#[derive(Debug)]
pub struct Server {
    config: Config,
    listener: TcpListener,
    local_addr: SocketAddr,
    store: Arc<Store>,
    registry: Arc<SessionRegistry>,
    stats: Arc<ConnectionStats>,
    reclaimer: Reclaimer,
}

impl Server {
    /// Builds the store, binds the listening socket and starts the reclaimer.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let store = Arc::new(build_store(&config).await);
        store.set_on_deleted(|key, _| debug!(key = %key, "Entry removed"));

        let addr = config.bind_address();
        let bind_error = |source| ServerError::Bind {
            addr: addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        info!(addr = %local_addr, "Listening");

        let reclaimer = Reclaimer::start(Arc::clone(&store), config.sweep_interval);

        Ok(Self {
            registry: Arc::new(SessionRegistry::new(config.max_users)),
            stats: Arc::new(ConnectionStats::new()),
            config,
            listener,
            local_addr,
            store,
            reclaimer,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Spawns the acceptor and returns the handle used to stop the server.
    pub fn start(self) -> ShutdownOrchestrator {
        let (stop_tx, stop_rx) = watch::channel(false);

        let acceptor = Acceptor {
            listener: self.listener,
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            poll: self.config.accept_poll,
            stop_rx,
        };
        let task = tokio::spawn(acceptor.run());

        ShutdownOrchestrator::new(
            self.local_addr,
            stop_tx,
            task,
            self.store,
            self.registry,
            self.stats,
            self.reclaimer,
            self.config.drain_timeout,
            self.config.snapshot_path,
        )
    }
}

/// Creates the store, restoring the snapshot only when configured to.
///
/// A snapshot that can't be read is logged and the store starts empty.
async fn build_store(config: &Config) -> Store {
    if !config.load_snapshot {
        return Store::new(config.default_ttl, config.capacity);
    }

    match snapshot::load(&config.snapshot_path).await {
        Ok(snapshot) => Store::from_snapshot(snapshot, config.default_ttl, config.capacity),
        Err(e) => {
            warn!(
                path = %config.snapshot_path.display(),
                error = %e,
                "Couldn't load snapshot, starting with an empty store"
            );
            Store::new(config.default_ttl, config.capacity)
        }
    }
}
