//! Snapshot Persistence
//!
//! The store is written to disk once, when the server stops, and can be read
//! back at startup when the server is configured to restore it.
//!
//! ## File Format
//!
//! A JSON object mapping each key to its entry:
//!
//! ```text
//! {
//!   "foo": { "Value": "bar", "Created": "2024-05-01T12:00:00Z", "Expiration": 1714565100000000000 },
//!   "pinned": { "Value": "1", "Created": "2024-05-01T12:00:00Z", "Expiration": 0 }
//! }
//! ```
//!
//! `Expiration` is an absolute instant in nanoseconds since the Unix epoch;
//! `0` means the entry never expires.

use crate::storage::engine::Entry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

/// All live entries of a store, keyed by entry key.
pub type Snapshot = BTreeMap<String, SnapshotItem>;

/// One entry as it appears in the snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotItem {
    #[serde(rename = "Value")]
    pub value: String,

    #[serde(rename = "Created", default)]
    pub created: DateTime<Utc>,

    /// Nanoseconds since the Unix epoch, 0 = never expires
    #[serde(rename = "Expiration")]
    pub expiration: i64,
}

impl SnapshotItem {
    pub(crate) fn from_entry(entry: &Entry) -> Self {
        let expiration = entry
            .expires_at
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);

        Self {
            value: entry.value.clone(),
            created: DateTime::<Utc>::from(entry.created_at),
            expiration,
        }
    }

    pub(crate) fn into_entry(self) -> Entry {
        let expires_at = if self.expiration > 0 {
            UNIX_EPOCH.checked_add(Duration::from_nanos(self.expiration as u64))
        } else {
            None
        };

        Entry {
            value: self.value,
            created_at: SystemTime::from(self.created),
            expires_at,
        }
    }
}

/// Errors from reading or writing the snapshot file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads a snapshot file.
///
/// A missing file is not an error and yields an empty snapshot.
pub async fn load(path: impl AsRef<Path>) -> Result<Snapshot, PersistenceError> {
    let path = path.as_ref();

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No snapshot file, starting empty");
            return Ok(Snapshot::new());
        }
        Err(e) => return Err(e.into()),
    };

    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    info!(path = %path.display(), entries = snapshot.len(), "Snapshot loaded");
    Ok(snapshot)
}

/// Writes a snapshot file, replacing any previous one.
///
/// The data goes to a sibling temporary file first and is renamed into place,
/// so a failed save never leaves a truncated snapshot behind.
pub async fn save(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    let mut bytes = serde_json::to_vec(snapshot)?;
    bytes.push(b'\n');

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;

    info!(path = %path.display(), entries = snapshot.len(), "Snapshot saved");
    Ok(())
}
