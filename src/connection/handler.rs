//! Session Handler Module
//!
//! Each admitted client gets its own [`Session`] task that reads request
//! lines, executes them and writes back one reply per line.
//!
//! ## Session Lifecycle
//!
//! ```text
//! 1. Acceptor admits the connection, registers it as Active
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │  read bytes ─> split lines   │
//!    │  execute ─> send reply       │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. EOF, `exit`, I/O error or forced close ─> Closing
//!        │
//!        ▼
//! 4. Connection released, deregistered ─> Closed
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut` buffer; complete lines are split
//! off the front. A line that grows past [`MAX_LINE_SIZE`] ends the session.

use crate::commands::{CommandHandler, Outcome};
use crate::connection::registry::{SessionHandle, SessionRegistry, SERVER_WRITE_TIMEOUT};
use crate::protocol::{Reply, NEWLINE};
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Maximum size of a single request line (64 KB)
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of sessions admitted
    pub connections_accepted: AtomicU64,
    /// Connections turned away because the server was full
    pub connections_rejected: AtomicU64,
    /// Currently running sessions
    pub active_sessions: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Why the session stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// Peer closed the connection
    Eof,
    /// Client sent `exit`
    Exit,
    /// Server closed the connection during shutdown
    Forced,
}

/// Errors that can occur while running a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request line exceeded the size limit
    #[error("request line exceeds {MAX_LINE_SIZE} bytes")]
    LineTooLong,
}

/// One client connection being served.
pub struct Session<R> {
    /// Registry entry for this session
    handle: Arc<SessionHandle>,

    /// Read side of the connection
    reader: R,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shares the store)
    command_handler: CommandHandler,

    /// Registry to leave when the session ends
    registry: Arc<SessionRegistry>,

    /// Flips to true on forced close
    close_rx: watch::Receiver<bool>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a session for an already registered handle.
    pub fn new(
        handle: Arc<SessionHandle>,
        reader: R,
        command_handler: CommandHandler,
        registry: Arc<SessionRegistry>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();
        let close_rx = handle.close_signal();

        Self {
            handle,
            reader,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            registry,
            close_rx,
            stats,
        }
    }

    /// Runs the session until the client leaves or the server closes it.
    ///
    /// Whatever the outcome, the connection is released and the session is
    /// removed from the registry before this returns.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let id = self.handle.id();
        info!(session = id, client = %self.handle.peer(), "Client joined the server");

        let result = self.main_loop().await;

        match &result {
            Ok(Ending::Eof) => debug!(session = id, "Client disconnected"),
            Ok(Ending::Exit) => debug!(session = id, "Client sent exit"),
            Ok(Ending::Forced) => debug!(session = id, "Session closed by server"),
            Err(SessionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                debug!(session = id, "Connection reset by client")
            }
            Err(e) => warn!(session = id, error = %e, "Session error"),
        }

        self.handle.begin_closing();
        // A peer that stopped reading can stall the flush forever
        if tokio::time::timeout(SERVER_WRITE_TIMEOUT, self.handle.shutdown_writer())
            .await
            .is_err()
        {
            warn!(session = id, "Timed out flushing replies, dropping connection");
        }
        self.registry.deregister(id);
        self.handle.mark_closed();
        self.stats.connection_closed();

        info!(session = id, "Client left the server");
        result.map(|_| ())
    }

    /// The read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<Ending, SessionError> {
        loop {
            while let Some(line) = self.next_line() {
                if let Some(ending) = self.process_line(&line).await? {
                    return Ok(ending);
                }
            }

            if let Some(ending) = self.read_more_data().await? {
                if ending == Ending::Eof && !self.buffer.is_empty() {
                    // Last line without a trailing newline
                    let line = self.buffer.split().freeze();
                    if let Some(ending) = self.process_line(&line).await? {
                        return Ok(ending);
                    }
                }
                return Ok(ending);
            }
        }
    }

    /// Splits one complete line off the front of the buffer.
    fn next_line(&mut self) -> Option<Bytes> {
        let pos = self.buffer.iter().position(|b| *b == NEWLINE)?;
        let mut line = self.buffer.split_to(pos + 1);
        line.truncate(pos);
        Some(line.freeze())
    }

    /// Executes one line; returns `Some` when the session should end.
    async fn process_line(&mut self, line: &[u8]) -> Result<Option<Ending>, SessionError> {
        let text = String::from_utf8_lossy(line);
        trace!(session = self.handle.id(), line = %text.trim(), "Received line");

        let outcome = self.command_handler.execute(&text);
        self.stats.command_processed();

        match outcome {
            Outcome::Reply(reply) => Ok(self.send(&reply).await?),
            Outcome::Close => {
                self.handle.begin_closing();
                Ok(Some(Ending::Exit))
            }
        }
    }

    /// Sends a reply unless a forced close interrupts it.
    async fn send(&mut self, reply: &Reply) -> Result<Option<Ending>, SessionError> {
        if *self.close_rx.borrow() {
            return Ok(Some(Ending::Forced));
        }

        tokio::select! {
            result = self.handle.send(reply) => {
                self.stats.bytes_written(result?);
                Ok(None)
            }
            _ = self.close_rx.changed() => Ok(Some(Ending::Forced)),
        }
    }

    /// Reads more data from the connection into the buffer.
    async fn read_more_data(&mut self) -> Result<Option<Ending>, SessionError> {
        if self.buffer.len() >= MAX_LINE_SIZE {
            return Err(SessionError::LineTooLong);
        }
        if *self.close_rx.borrow() {
            return Ok(Some(Ending::Forced));
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        tokio::select! {
            result = self.reader.read_buf(&mut self.buffer) => {
                let n = result?;
                if n == 0 {
                    return Ok(Some(Ending::Eof));
                }
                self.stats.bytes_read(n);
                trace!(session = self.handle.id(), bytes = n, "Read data");
                Ok(None)
            }
            _ = self.close_rx.changed() => Ok(Some(Ending::Forced)),
        }
    }
}

/// Runs a session to completion, logging instead of returning its error.
pub async fn handle_session<R>(session: Session<R>)
where
    R: AsyncRead + Unpin,
{
    if let Err(e) = session.run().await {
        debug!(error = %e, "Session ended with error");
    }
}
