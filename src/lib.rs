//! # MemoryDB - A Small In-Memory Key-Value Server
//!
//! MemoryDB keeps string values in memory, serves them to a handful of
//! concurrent clients over a plain-text line protocol, expires them after a
//! time-to-live and writes whatever is still alive to a JSON snapshot when the
//! server is stopped.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              MemoryDB                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Acceptor   │───>│   Session   │───>│  Command    │                  │
//! │  │ (Listener)  │    │  (per TCP)  │    │  Handler    │                  │
//! │  └──────┬──────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │         │                  │                  │                         │
//! │         ▼                  ▼                  ▼                         │
//! │  ┌──────────────────────────────┐   ┌──────────────────────────────┐   │
//! │  │       SessionRegistry        │   │            Store             │   │
//! │  │   (max 5 active sessions)    │   │  RwLock<HashMap>, capacity   │   │
//! │  └──────────────────────────────┘   └──────────────┬───────────────┘   │
//! │         ▲                                          ▲                    │
//! │         │ broadcast / close_all                    │ sweep              │
//! │  ┌──────┴───────────────────────┐   ┌──────────────┴───────────────┐   │
//! │  │    ShutdownOrchestrator      │   │          Reclaimer           │   │
//! │  │  drain, close, save snapshot │   │    (Background Tokio Task)   │   │
//! │  └──────────────────────────────┘   └──────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use memorydb::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(Config::default()).await?;
//!     let mut running = server.start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     running.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! Commands are case-insensitive, one per line:
//!
//! - `SET key value ttl` - store a value, overwriting any live one
//! - `ADD key value ttl` - store a value only if the key is free
//! - `GET key`
//! - `DELETE key`
//! - `EXIT`
//!
//! `ttl` is required: a duration such as `30s`, `1m30s` or `250ms`, or `never`.
//! A zero duration (`0`) selects the store's default (5 minutes).
//!
//! ## Module Overview
//!
//! - [`protocol`]: line parsing, replies and duration formatting
//! - [`storage`]: the store, background reclamation and snapshots
//! - [`commands`]: executes parsed commands against the store
//! - [`connection`]: per-client sessions and the session registry
//! - [`server`]: accepting clients and the shutdown sequence
//! - [`config`]: server settings and command-line parsing
//!
//! ## Expiry
//!
//! Entries are expired in two ways:
//! 1. **Lazy**: a read of an expired entry behaves as if it were absent
//! 2. **Active**: the [`Reclaimer`] periodically sweeps expired entries out

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{CliAction, Config, ConfigError};
pub use connection::{ConnectionStats, SessionRegistry};
pub use protocol::{ParseError, Reply};
pub use server::{Server, ServerError, ShutdownOrchestrator, ShutdownState, ShutdownSummary};
pub use storage::{Reclaimer, Snapshot, Store, StoreError, Ttl};

/// Version of MemoryDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
