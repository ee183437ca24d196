//! Session Registry
//!
//! Tracks every admitted session so the server can enforce the concurrent
//! client limit and reach all connections during shutdown.
//!
//! Registration checks the number of `Active` sessions and inserts the new one
//! under the same lock, so two simultaneous accepts can never both take the last
//! free slot. Deregistration takes the same lock.

use crate::protocol::Reply;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Default number of concurrently active sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 5;

/// Upper bound on a single server-initiated write (broadcasts, forced closes).
pub(crate) const SERVER_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write half of a client connection, shared by the session task and the registry.
pub type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Wraps any writer into a [`SharedWriter`].
pub fn shared_writer<W>(writer: W) -> SharedWriter
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    Arc::new(tokio::sync::Mutex::new(Box::new(writer)))
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading and executing commands
    Active,
    /// Exit requested or forced close in progress
    Closing,
    /// Connection released
    Closed,
}

/// Registry-side view of one session.
pub struct SessionHandle {
    id: u64,
    peer: String,
    writer: SharedWriter,
    state: Mutex<SessionState>,
    close_tx: watch::Sender<bool>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}

impl SessionHandle {
    fn new(id: u64, peer: String, writer: SharedWriter) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            id,
            peer,
            writer,
            state: Mutex::new(SessionState::Active),
            close_tx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves an `Active` session to `Closing`; returns false if it already left `Active`.
    pub(crate) fn begin_closing(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SessionState::Active {
            *state = SessionState::Closing;
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_closed(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = SessionState::Closed;
    }

    /// Receiver that flips to `true` when the session must stop.
    pub(crate) fn close_signal(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }

    /// Writes one framed reply to the client; returns the bytes written.
    pub async fn send(&self, reply: &Reply) -> io::Result<usize> {
        let bytes = reply.serialize();
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(bytes.len())
    }

    /// Shuts down the write side of the connection.
    pub(crate) async fn shutdown_writer(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(session = self.id, error = %e, "Connection shutdown failed");
        }
    }

    /// Forcibly ends the session: signals its task and closes the connection.
    pub async fn force_close(&self) {
        self.begin_closing();
        self.close_tx.send_replace(true);

        match tokio::time::timeout(SERVER_WRITE_TIMEOUT, self.shutdown_writer()).await {
            Ok(()) => debug!(session = self.id, "Connection closed by server"),
            Err(_) => warn!(session = self.id, "Timed out closing connection"),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    sessions: HashMap<u64, Arc<SessionHandle>>,
}

/// All sessions admitted and not yet released.
#[derive(Debug)]
pub struct SessionRegistry {
    max_sessions: usize,
    inner: Mutex<RegistryInner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of concurrently active sessions.
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Admits a new session unless `max_sessions` are already active.
    ///
    /// Returns `None` when the server is full; the caller still owns the connection.
    pub fn try_register(&self, peer: impl Into<String>, writer: SharedWriter) -> Option<Arc<SessionHandle>> {
        let mut inner = self.lock();

        let active = inner
            .sessions
            .values()
            .filter(|s| s.state() == SessionState::Active)
            .count();
        if active >= self.max_sessions {
            return None;
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let handle = Arc::new(SessionHandle::new(id, peer.into(), writer));
        inner.sessions.insert(id, Arc::clone(&handle));
        Some(handle)
    }

    /// Removes a session; returns the handle if it was registered.
    pub fn deregister(&self, id: u64) -> Option<Arc<SessionHandle>> {
        self.lock().sessions.remove(&id)
    }

    /// Returns true if the session is still registered.
    pub fn contains(&self, id: u64) -> bool {
        self.lock().sessions.contains_key(&id)
    }

    /// Number of registered sessions, whatever their state.
    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of sessions in the `Active` state.
    pub fn active_count(&self) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|s| s.state() == SessionState::Active)
            .count()
    }

    /// Copy of every registered handle, taken under the lock.
    pub fn sessions(&self) -> Vec<Arc<SessionHandle>> {
        let mut sessions: Vec<_> = self.lock().sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.id());
        sessions
    }

    /// Sends `reply` to every registered session; returns how many writes succeeded.
    pub async fn broadcast(&self, reply: &Reply) -> usize {
        let mut delivered = 0;
        for session in self.sessions() {
            match tokio::time::timeout(SERVER_WRITE_TIMEOUT, session.send(reply)).await {
                Ok(Ok(_)) => delivered += 1,
                Ok(Err(e)) => warn!(session = session.id(), error = %e, "Broadcast write failed"),
                Err(_) => warn!(session = session.id(), "Broadcast write timed out"),
            }
        }
        delivered
    }

    /// Forcibly closes every registered session; returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let sessions = self.sessions();
        for session in &sessions {
            session.force_close().await;
        }
        sessions.len()
    }
}
