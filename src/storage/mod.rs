//! Storage Module
//!
//! This module provides the data layer of MemoryDB: a thread-safe key-value
//! store with per-entry TTL and a capacity limit, the background reclaimer
//! that sweeps expired entries, and snapshot persistence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                               │
//! │          RwLock<HashMap<String, Entry>> (cap 50)            │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                        ▲                   │
//!          │ set/add/get/delete     │ sweep()           │ snapshot()
//!          │                        │                   ▼
//!   ┌──────┴──────┐         ┌───────┴───────┐   ┌───────────────┐
//!   │  Sessions   │         │   Reclaimer   │   │ snapshot::save│
//!   └─────────────┘         │ (Tokio task)  │   └───────────────┘
//!                           └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use memorydb::storage::{Store, Ttl};
//! use std::time::Duration;
//!
//! let store = Store::default();
//!
//! store.set("name", "ferris", Ttl::Default).unwrap();
//! store.set("token", "abc123", Ttl::After(Duration::from_secs(3600))).unwrap();
//! store.set("pinned", "forever", Ttl::Never).unwrap();
//!
//! assert_eq!(store.get("token"), Some("abc123".to_string()));
//! ```

pub mod engine;
pub mod expiry;
pub mod snapshot;

// Re-export commonly used types
pub use engine::{
    DeleteCallback, Entry, StorageStats, Store, StoreError, Ttl, DEFAULT_CAPACITY, DEFAULT_TTL,
};
pub use expiry::{Reclaimer, DEFAULT_SWEEP_INTERVAL};
pub use snapshot::{PersistenceError, Snapshot, SnapshotItem};
