//! Command Handler Module
//!
//! Executes parsed request lines against the store and builds the reply text.
//!
//! ## Supported Commands
//!
//! - `SET key value ttl` - Write a value, replacing any previous one
//! - `ADD key value ttl` - Write a value only if the key holds no live value
//! - `GET key` - Read a value
//! - `DELETE key` - Remove a value
//! - `EXIT` - Close the session
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ parse_line()│───>│  dispatch() │───>│  cmd_*()    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                             Store           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::protocol::{describe_ttl, parse_line, Command, Reply};
use crate::storage::{Store, StoreError, Ttl};
use std::sync::Arc;
use tracing::{debug, trace};

/// What a session should do after executing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Send this reply and keep reading
    Reply(Reply),
    /// Close the connection without replying
    Close,
}

impl Outcome {
    fn reply(message: impl Into<String>) -> Self {
        Outcome::Reply(Reply::new(message))
    }
}

/// Dispatches client commands to the store.
///
/// Cloning is cheap; every session gets its own handler sharing one store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    /// Creates a new command handler with the given store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Parses and executes one request line.
    ///
    /// Parse failures are reported back to the client as a reply; they never
    /// close the session.
    pub fn execute(&self, line: &str) -> Outcome {
        match parse_line(line) {
            Ok(command) => {
                trace!(command = command.name(), "Dispatching command");
                self.dispatch(command)
            }
            Err(e) => {
                debug!(error = %e, "Rejected request line");
                Outcome::reply(e.to_string())
            }
        }
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, command: Command) -> Outcome {
        match command {
            Command::Set { key, value, ttl } => self.cmd_set(&key, &value, ttl),
            Command::Add { key, value, ttl } => self.cmd_add(&key, &value, ttl),
            Command::Get { key } => self.cmd_get(&key),
            Command::Delete { key } => self.cmd_delete(&key),
            Command::Exit => Outcome::Close,
        }
    }

    /// SET key value ttl
    fn cmd_set(&self, key: &str, value: &str, ttl: Ttl) -> Outcome {
        match self.store.set(key, value, ttl) {
            Ok(()) => Outcome::reply(format!(
                "Set value for key {key}, expires in {}",
                describe_ttl(ttl, self.store.default_ttl())
            )),
            Err(e) => self.store_error(e),
        }
    }

    /// ADD key value ttl
    fn cmd_add(&self, key: &str, value: &str, ttl: Ttl) -> Outcome {
        match self.store.add(key, value, ttl) {
            Ok(()) => Outcome::reply(format!(
                "Added value for key {key}, expires in {}",
                describe_ttl(ttl, self.store.default_ttl())
            )),
            Err(e) => self.store_error(e),
        }
    }

    /// GET key
    fn cmd_get(&self, key: &str) -> Outcome {
        match self.store.get(key) {
            Some(value) => Outcome::reply(value),
            None => Outcome::reply(format!("Key {key} not found")),
        }
    }

    /// DELETE key
    fn cmd_delete(&self, key: &str) -> Outcome {
        if self.store.delete(key) {
            Outcome::reply(format!("Deleted key {key}"))
        } else {
            Outcome::reply(format!("Key {key} not found"))
        }
    }

    fn store_error(&self, error: StoreError) -> Outcome {
        match error {
            StoreError::AlreadyExists(_) => Outcome::reply(error.to_string()),
            StoreError::CapacityExceeded { capacity } => Outcome::reply(format!(
                "Store is full ({capacity} entries), delete something before adding new values"
            )),
        }
    }
}
