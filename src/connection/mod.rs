//! Connection Module
//!
//! This module manages client sessions. Every admitted connection is served
//! by its own async task, and every live session is tracked in a shared
//! registry bounded to a fixed number of concurrent clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Acceptor                              │
//! │                    (server module)                          │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ try_register()
//!                        ▼
//!           ┌────────────────────────┐
//!           │    SessionRegistry     │──── broadcast / close_all
//!           │   (max 5 Active)       │     (shutdown)
//!           └────────────┬───────────┘
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Session                               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read line   │───>│ Execute cmd │───>│ Send reply  │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod handler;
pub mod registry;

// Re-export commonly used types
pub use handler::{handle_session, ConnectionStats, Session, SessionError, MAX_LINE_SIZE};
pub use registry::{
    shared_writer, SessionHandle, SessionRegistry, SessionState, SharedWriter, DEFAULT_MAX_SESSIONS,
};
