//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core store of MemoryDB: a single
//! `RwLock`-protected map from key to [`Entry`] with per-entry TTL and a
//! hard capacity limit.
//!
//! ## Design Decisions
//!
//! 1. **One lock**: readers share the lock, every mutation takes it exclusively.
//!    The capacity check and the insert happen under the same write guard.
//! 2. **Lazy Expiry**: reads treat expired entries as absent but never delete them.
//!    Removal is left to [`Store::sweep`], driven by the background reclaimer.
//! 3. **Callbacks outside the lock**: `delete` and `sweep` collect the removed
//!    pairs while locked and fire the deletion callback after the guard is dropped,
//!    so callbacks may call back into the store.
//!
//! ## Expiry Boundary
//!
//! An entry expiring at `E` is live at every instant `t <= E` and gone for `t > E`.

use crate::storage::snapshot::{Snapshot, SnapshotItem};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum number of live entries a store holds by default.
pub const DEFAULT_CAPACITY: usize = 50;

/// Default TTL applied when a command asks for [`Ttl::Default`].
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// How long a written entry should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Use the store-wide default TTL
    Default,
    /// Never expire
    Never,
    /// Expire this long after the write
    After(Duration),
}

impl Ttl {
    /// Resolves this TTL into an absolute expiry instant, `None` meaning never.
    fn expires_at(self, now: SystemTime, default_ttl: Duration) -> Option<SystemTime> {
        match self {
            Ttl::Default => now.checked_add(default_ttl),
            Ttl::Never => None,
            Ttl::After(d) => now.checked_add(d),
        }
    }
}

/// Errors returned by store mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// `add` found a live value under the key
    #[error("value with key {0} already exists")]
    AlreadyExists(String),

    /// The insert would push the live entry count past the capacity
    #[error("store is full ({capacity} entries)")]
    CapacityExceeded { capacity: usize },
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: String,
    /// When this entry was written
    pub created_at: SystemTime,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<SystemTime>,
}

impl Entry {
    /// Returns true if the entry is no longer live at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.map(|exp| now > exp).unwrap_or(false)
    }
}

/// Callback fired with `(key, value)` for every entry removed by `delete` or `sweep`.
pub type DeleteCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Operation counters for a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: usize,
    pub get_ops: u64,
    pub set_ops: u64,
    pub add_ops: u64,
    pub del_ops: u64,
    pub expired: u64,
    pub rejected: u64,
}

/// The key-value store shared by every session and the reclaimer.
///
/// Wrap it in an `Arc` to share it across tasks; every method takes `&self`.
///
/// # Example
///
/// ```
/// use memorydb::storage::{Store, Ttl};
/// use std::time::Duration;
///
/// let store = Store::new(Duration::from_secs(300), 50);
/// store.set("name", "ferris", Ttl::Never).unwrap();
/// assert_eq!(store.get("name"), Some("ferris".to_string()));
///
/// // A live key cannot be added twice
/// assert!(store.add("name", "crab", Ttl::Default).is_err());
/// ```
pub struct Store {
    items: RwLock<HashMap<String, Entry>>,
    default_ttl: Duration,
    capacity: usize,
    on_deleted: RwLock<Option<DeleteCallback>>,

    get_count: AtomicU64,
    set_count: AtomicU64,
    add_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
    rejected_count: AtomicU64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("keys", &self.len())
            .field("capacity", &self.capacity)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl Store {
    /// Creates an empty store.
    pub fn new(default_ttl: Duration, capacity: usize) -> Self {
        Self::with_items(HashMap::new(), default_ttl, capacity)
    }

    /// Creates a store pre-filled from a snapshot.
    ///
    /// Entries that already expired are dropped. If the snapshot holds more live
    /// entries than `capacity`, the surplus is discarded with a warning.
    pub fn from_snapshot(snapshot: Snapshot, default_ttl: Duration, capacity: usize) -> Self {
        let now = SystemTime::now();
        let mut items = HashMap::with_capacity(snapshot.len().min(capacity));
        let mut skipped = 0usize;

        for (key, item) in snapshot {
            let entry = item.into_entry();
            if entry.is_expired_at(now) {
                continue;
            }
            if items.len() >= capacity {
                skipped += 1;
                continue;
            }
            items.insert(key, entry);
        }

        if skipped > 0 {
            warn!(skipped, capacity, "Snapshot holds more entries than the store capacity");
        }

        Self::with_items(items, default_ttl, capacity)
    }

    fn with_items(items: HashMap<String, Entry>, default_ttl: Duration, capacity: usize) -> Self {
        Self {
            items: RwLock::new(items),
            default_ttl,
            capacity,
            on_deleted: RwLock::new(None),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            add_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the callback fired for entries removed by `delete` and `sweep`.
    pub fn set_on_deleted<F>(&self, f: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let mut slot = self.on_deleted.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(f));
    }

    fn deletion_callback(&self) -> Option<DeleteCallback> {
        self.on_deleted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The TTL used for [`Ttl::Default`].
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Maximum number of live entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unconditionally writes `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), StoreError> {
        self.set_at(key, value, ttl, SystemTime::now())
    }

    /// [`Store::set`] evaluated at `now`.
    pub fn set_at(&self, key: &str, value: &str, ttl: Ttl, now: SystemTime) -> Result<(), StoreError> {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut items = self.write();
        self.ensure_room(&items, key, now)?;
        items.insert(key.to_string(), self.make_entry(value, ttl, now));
        Ok(())
    }

    /// Writes `value` under `key` only if no live value is stored there.
    ///
    /// An expired entry under the same key counts as absent and is overwritten.
    pub fn add(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), StoreError> {
        self.add_at(key, value, ttl, SystemTime::now())
    }

    /// [`Store::add`] evaluated at `now`.
    pub fn add_at(&self, key: &str, value: &str, ttl: Ttl, now: SystemTime) -> Result<(), StoreError> {
        self.add_count.fetch_add(1, Ordering::Relaxed);

        let mut items = self.write();
        if items.get(key).is_some_and(|e| !e.is_expired_at(now)) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        self.ensure_room(&items, key, now)?;
        items.insert(key.to_string(), self.make_entry(value, ttl, now));
        Ok(())
    }

    /// Checks that writing `key` keeps the live entry count within capacity.
    ///
    /// Must be called with the write guard held, in the same critical section as the insert.
    fn ensure_room(&self, items: &HashMap<String, Entry>, key: &str, now: SystemTime) -> Result<(), StoreError> {
        // Replacing a live entry never grows the live set.
        if items.get(key).is_some_and(|e| !e.is_expired_at(now)) {
            return Ok(());
        }

        let live = items.values().filter(|e| !e.is_expired_at(now)).count();
        if live >= self.capacity {
            self.rejected_count.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, capacity = self.capacity, "Store is full, rejecting insert");
            return Err(StoreError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn make_entry(&self, value: &str, ttl: Ttl, now: SystemTime) -> Entry {
        Entry {
            value: value.to_string(),
            created_at: now,
            expires_at: ttl.expires_at(now, self.default_ttl),
        }
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. Expired entries
    /// stay in place until swept.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, SystemTime::now())
    }

    /// [`Store::get`] evaluated at `now`.
    pub fn get_at(&self, key: &str, now: SystemTime) -> Option<String> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let items = self.read();
        items
            .get(key)
            .filter(|e| !e.is_expired_at(now))
            .map(|e| e.value.clone())
    }

    /// Gets the full entry for a live key.
    pub fn get_entry(&self, key: &str) -> Option<Entry> {
        let now = SystemTime::now();
        let items = self.read();
        items.get(key).filter(|e| !e.is_expired_at(now)).cloned()
    }

    /// Removes a key.
    ///
    /// Returns `true` if an entry was removed. The deletion callback runs after
    /// the lock is released.
    pub fn delete(&self, key: &str) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let removed = {
            let mut items = self.write();
            items.remove(key)
        };

        match removed {
            Some(entry) => {
                if let Some(callback) = self.deletion_callback() {
                    callback(key, &entry.value);
                }
                true
            }
            None => false,
        }
    }

    /// Removes every expired entry and returns how many were removed.
    ///
    /// This is called by the background reclaimer.
    pub fn sweep(&self) -> usize {
        self.sweep_at(SystemTime::now())
    }

    /// [`Store::sweep`] evaluated at `now`.
    pub fn sweep_at(&self, now: SystemTime) -> usize {
        let removed: Vec<(String, String)> = {
            let mut items = self.write();
            let expired: Vec<String> = items
                .iter()
                .filter(|(_, e)| e.is_expired_at(now))
                .map(|(k, _)| k.clone())
                .collect();

            expired
                .into_iter()
                .filter_map(|k| items.remove(&k).map(|e| (k, e.value)))
                .collect()
        };

        if removed.is_empty() {
            return 0;
        }

        self.expired_count
            .fetch_add(removed.len() as u64, Ordering::Relaxed);

        if let Some(callback) = self.deletion_callback() {
            for (key, value) in &removed {
                callback(key, value);
            }
        }

        debug!(removed = removed.len(), "Swept expired entries");
        removed.len()
    }

    /// Empties the store without firing any callbacks.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries live right now.
    pub fn live_len(&self) -> usize {
        let now = SystemTime::now();
        self.read().values().filter(|e| !e.is_expired_at(now)).count()
    }

    /// Point-in-time copy of every live entry.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_at(SystemTime::now())
    }

    /// [`Store::snapshot`] evaluated at `now`.
    pub fn snapshot_at(&self, now: SystemTime) -> Snapshot {
        let items = self.read();
        items
            .iter()
            .filter(|(_, e)| !e.is_expired_at(now))
            .map(|(k, e)| (k.clone(), SnapshotItem::from_entry(e)))
            .collect()
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            add_ops: self.add_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
            rejected: self.rejected_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn store() -> Store {
        Store::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    #[test]
    fn test_set_and_get() {
        let store = store();

        store.set("key", "value", Ttl::Default).unwrap();
        assert_eq!(store.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = store();
        assert_eq!(store.get("nonexistent"), None);
    }

    #[test]
    fn test_set_overwrites_value_and_expiry() {
        let store = store();
        let t0 = SystemTime::now();

        store
            .set_at("key", "old", Ttl::After(Duration::from_secs(1)), t0)
            .unwrap();
        store.set_at("key", "new", Ttl::Never, t0).unwrap();

        let later = t0 + Duration::from_secs(3600);
        assert_eq!(store.get_at("key", later), Some("new".to_string()));
    }

    #[test]
    fn test_delete() {
        let store = store();

        store.set("key", "value", Ttl::Never).unwrap();
        assert!(store.delete("key"));
        assert_eq!(store.get("key"), None);
        assert!(!store.delete("key")); // Already deleted
    }

    #[test]
    fn test_expiry_boundary() {
        let store = store();
        let t0 = SystemTime::now();
        let ttl = Duration::from_secs(10);

        store.set_at("key", "value", Ttl::After(ttl), t0).unwrap();

        assert_eq!(store.get_at("key", t0), Some("value".to_string()));
        assert_eq!(store.get_at("key", t0 + ttl), Some("value".to_string()));
        assert_eq!(store.get_at("key", t0 + ttl + Duration::from_nanos(1)), None);

        // Lazy expiry: the read did not remove the entry
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_default_ttl_applies() {
        let store = store();
        let t0 = SystemTime::now();

        store.set_at("x", "1", Ttl::Default, t0).unwrap();

        assert_eq!(store.get_at("x", t0), Some("1".to_string()));
        assert_eq!(
            store.get_at("x", t0 + DEFAULT_TTL + Duration::from_secs(1)),
            None
        );
    }

    #[test]
    fn test_add_rejects_live_key() {
        let store = store();

        store.add("foo", "bar", Ttl::After(Duration::from_secs(10))).unwrap();
        let err = store
            .add("foo", "baz", Ttl::After(Duration::from_secs(5)))
            .unwrap_err();

        assert_eq!(err, StoreError::AlreadyExists("foo".to_string()));
        assert_eq!(err.to_string(), "value with key foo already exists");
        assert_eq!(store.get("foo"), Some("bar".to_string()));
    }

    #[test]
    fn test_add_overwrites_expired_key() {
        let store = store();

        store.add("k", "v1", Ttl::After(Duration::from_nanos(1))).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        store.add("k", "v2", Ttl::Never).unwrap();
        assert_eq!(store.get("k"), Some("v2".to_string()));
    }

    #[test]
    fn test_capacity_limit() {
        let store = store();

        for i in 0..DEFAULT_CAPACITY {
            if i % 2 == 0 {
                store.set(&format!("key{i}"), "v", Ttl::Never).unwrap();
            } else {
                store.add(&format!("key{i}"), "v", Ttl::Never).unwrap();
            }
        }

        assert_eq!(
            store.set("one-too-many", "v", Ttl::Never),
            Err(StoreError::CapacityExceeded { capacity: 50 })
        );
        assert_eq!(
            store.add("one-too-many", "v", Ttl::Never),
            Err(StoreError::CapacityExceeded { capacity: 50 })
        );
        assert_eq!(store.live_len(), DEFAULT_CAPACITY);
        assert_eq!(store.stats().rejected, 2);

        // Overwriting a live key is not growth
        store.set("key0", "updated", Ttl::Never).unwrap();
        assert_eq!(store.get("key0"), Some("updated".to_string()));
    }

    #[test]
    fn test_capacity_ignores_expired_entries() {
        let store = Store::new(DEFAULT_TTL, 2);
        let t0 = SystemTime::now();

        store
            .set_at("a", "1", Ttl::After(Duration::from_secs(1)), t0)
            .unwrap();
        store.set_at("b", "2", Ttl::Never, t0).unwrap();

        let later = t0 + Duration::from_secs(2);
        store.set_at("c", "3", Ttl::Never, later).unwrap();
        assert_eq!(store.get_at("c", later), Some("3".to_string()));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = store();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        store.set_on_deleted(move |k, v| sink.lock().unwrap().push((k.to_string(), v.to_string())));

        let t0 = SystemTime::now();
        for i in 0..3 {
            store
                .set_at(&format!("short{i}"), "s", Ttl::After(Duration::from_secs(1)), t0)
                .unwrap();
        }
        store
            .set_at("long", "l", Ttl::After(Duration::from_secs(3600)), t0)
            .unwrap();
        store.set_at("forever", "f", Ttl::Never, t0).unwrap();

        let removed = store.sweep_at(t0 + Duration::from_secs(2));

        assert_eq!(removed, 3);
        assert_eq!(store.len(), 2);
        let mut fired = fired.lock().unwrap().clone();
        fired.sort();
        assert_eq!(
            fired,
            vec![
                ("short0".to_string(), "s".to_string()),
                ("short1".to_string(), "s".to_string()),
                ("short2".to_string(), "s".to_string()),
            ]
        );
        assert_eq!(store.stats().expired, 3);
    }

    #[test]
    fn test_delete_callback_may_reenter_store() {
        let store = Arc::new(store());
        let inner = Arc::clone(&store);
        store.set_on_deleted(move |k, v| {
            inner.set(&format!("{k}-tombstone"), v, Ttl::Never).unwrap();
        });

        store.set("key", "value", Ttl::Never).unwrap();
        assert!(store.delete("key"));
        assert_eq!(store.get("key-tombstone"), Some("value".to_string()));
    }

    #[test]
    fn test_clear_fires_no_callbacks() {
        let store = store();
        let fired = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fired);
        store.set_on_deleted(move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        store.set("a", "1", Ttl::Never).unwrap();
        store.set("b", "2", Ttl::Never).unwrap();
        store.clear();

        assert!(store.is_empty());
        assert_eq!(fired.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_snapshot_only_live_entries() {
        let store = store();
        let t0 = SystemTime::now();

        store
            .set_at("gone", "1", Ttl::After(Duration::from_secs(1)), t0)
            .unwrap();
        store.set_at("kept", "2", Ttl::Never, t0).unwrap();

        let snapshot = store.snapshot_at(t0 + Duration::from_secs(5));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["kept"].value, "2");
        assert_eq!(snapshot["kept"].expiration, 0);
    }

    #[test]
    fn test_from_snapshot_drops_expired() {
        let source = store();
        source.set("kept", "1", Ttl::Never).unwrap();
        source
            .set("soon", "2", Ttl::After(Duration::from_millis(1)))
            .unwrap();
        let snapshot = source.snapshot_at(SystemTime::now() - Duration::from_secs(1));

        std::thread::sleep(Duration::from_millis(5));
        let restored = Store::from_snapshot(snapshot, DEFAULT_TTL, DEFAULT_CAPACITY);

        assert_eq!(restored.get("kept"), Some("1".to_string()));
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_concurrent_inserts_respect_capacity() {
        use std::thread;

        let store = Arc::new(store());
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let mut accepted = 0;
                for j in 0..20 {
                    if store.add(&format!("key-{i}-{j}"), "v", Ttl::Never).is_ok() {
                        accepted += 1;
                    }
                }
                accepted
            }));
        }

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, DEFAULT_CAPACITY);
        assert_eq!(store.len(), DEFAULT_CAPACITY);
    }
}
