//! Connection Acceptor
//!
//! Owns the listening socket. Each accept attempt waits at most `poll`, so the
//! stop flag is checked at least that often. When the flag is set the listener
//! is dropped and the set of running session tasks is handed back to the caller.

use crate::commands::CommandHandler;
use crate::connection::{handle_session, shared_writer, ConnectionStats, Session, SessionRegistry};
use crate::protocol::Reply;
use crate::storage::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Sent to every admitted client.
pub const WELCOME_MESSAGE: &str = "Welcome to MemoryDB server";

/// Sent to clients turned away because every slot is taken.
pub const SERVER_FULL_MESSAGE: &str = "The MemoryDB server is full, try to connect later";

pub(crate) struct Acceptor {
    pub(crate) listener: TcpListener,
    pub(crate) store: Arc<Store>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) stats: Arc<ConnectionStats>,
    pub(crate) poll: Duration,
    pub(crate) stop_rx: watch::Receiver<bool>,
}

impl Acceptor {
    /// Accepts connections until the stop flag is set.
    ///
    /// Returns the session tasks still running at that point.
    pub(crate) async fn run(self) -> JoinSet<()> {
        let mut sessions = JoinSet::new();
        info!("Listening for clients");

        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            // Reap finished sessions so the set doesn't grow unbounded
            while sessions.try_join_next().is_some() {}

            match tokio::time::timeout(self.poll, self.listener.accept()).await {
                Err(_) => continue,
                Ok(Ok((stream, addr))) => self.admit(stream, addr, &mut sessions).await,
                Ok(Err(e)) => error!(error = %e, "Failed to accept connection"),
            }
        }

        drop(self.listener);
        info!("Listener closed, no longer accepting clients");
        sessions
    }

    async fn admit(&self, stream: TcpStream, addr: SocketAddr, sessions: &mut JoinSet<()>) {
        let (reader, writer) = stream.into_split();
        let writer = shared_writer(BufWriter::new(writer));

        let Some(handle) = self.registry.try_register(addr.to_string(), Arc::clone(&writer)) else {
            self.stats.connection_rejected();
            info!(client = %addr, "Client tried to connect, but server is full");

            let mut writer = writer.lock().await;
            let bytes = Reply::new(SERVER_FULL_MESSAGE).serialize();
            if let Err(e) = writer.write_all(&bytes).await {
                debug!(client = %addr, error = %e, "Failed to notify rejected client");
            }
            let _ = writer.flush().await;
            let _ = writer.shutdown().await;
            return;
        };

        if let Err(e) = handle.send(&Reply::new(WELCOME_MESSAGE)).await {
            warn!(session = handle.id(), error = %e, "Failed to greet client");
        }

        let session = Session::new(
            handle,
            reader,
            CommandHandler::new(Arc::clone(&self.store)),
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
        );
        sessions.spawn(handle_session(session));
    }
}
