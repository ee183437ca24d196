//! Command Handler Module
//!
//! This module implements the command processing layer for MemoryDB.
//! It receives request lines, executes them against the store,
//! and returns the reply for the session to send.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

// Re-export the main command handler
pub use handler::{CommandHandler, Outcome};
