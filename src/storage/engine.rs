//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the default [`Store`] for FlashCache: a concurrent
//! HashMap of [`CacheItem`]s with TTL (Time-To-Live) support.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instead of one big lock, we use multiple shards to reduce contention.
//! 2. **Lazy Expiry**: Items are checked for expiry on access (lazy) plus background cleanup.
//! 3. **RwLock**: Allows multiple concurrent readers with exclusive writers.
//! 4. **Item Size Limit**: Writes larger than `max_item_size` are refused.
//! 5. **Capacity Budget**: The sum of live cost hints is kept under `max_cost`;
//!    a write that overshoots it evicts other entries, expired ones first.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards using a hash function.
//! This allows multiple connections to read/write different keys concurrently.

use crate::storage::store::{CacheItem, Store, StoreError};
use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Number of shards for the storage engine.
/// More shards = less lock contention, but more memory overhead.
const NUM_SHARDS: usize = 64;

/// Default per-item size limit (1 MiB, same as memcached)
pub const DEFAULT_MAX_ITEM_SIZE: usize = 1024 * 1024;

/// Default capacity budget (1 GiB of cost)
pub const DEFAULT_MAX_COST: u64 = 1 << 30;

/// Represents a stored item with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The cached item
    pub item: CacheItem,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
    /// Capacity cost supplied by the writer
    pub cost: u64,
}

impl Entry {
    /// Creates a new entry, expiring after `ttl` if one is given.
    pub fn new(item: CacheItem, cost: u64, ttl: Option<Duration>) -> Self {
        Self {
            item,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
            cost,
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }
}

/// A single shard containing a portion of the items.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub expired: u64,
    pub evicted: u64,
    pub total_cost: u64,
}

/// The main storage engine for FlashCache.
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all client handler tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use flashcache::storage::{CacheItem, StorageEngine, Store};
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine
///     .set_with_ttl(Bytes::from("name"), CacheItem::new("Ariz", 0), 4, None)
///     .unwrap();
/// assert_eq!(engine.get(b"name"), Some(CacheItem::new("Ariz", 0)));
///
/// engine
///     .set_with_ttl(
///         Bytes::from("session"),
///         CacheItem::new("abc123", 7),
///         6,
///         Some(Duration::from_secs(60)),
///     )
///     .unwrap();
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,

    /// Largest payload accepted by a write
    max_item_size: usize,

    /// Upper bound on `total_cost`
    max_cost: u64,

    /// Shard where the next eviction pass starts
    evict_cursor: AtomicUsize,

    key_count: AtomicU64,
    expired_count: AtomicU64,
    evicted_count: AtomicU64,

    /// Sum of the cost hints of live entries (approximate)
    total_cost: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("max_item_size", &self.max_item_size)
            .field("max_cost", &self.max_cost)
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("total_cost", &self.total_cost.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new storage engine with the default limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ITEM_SIZE, DEFAULT_MAX_COST)
    }

    /// Creates a new storage engine that refuses payloads above `max_item_size`.
    pub fn with_max_item_size(max_item_size: usize) -> Self {
        Self::with_limits(max_item_size, DEFAULT_MAX_COST)
    }

    /// Creates a new storage engine with an item size limit and a capacity budget.
    pub fn with_limits(max_item_size: usize, max_cost: u64) -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            max_item_size,
            max_cost,
            evict_cursor: AtomicUsize::new(0),
            key_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
            evicted_count: AtomicU64::new(0),
            total_cost: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Gets the full entry for a key (including metadata).
    ///
    /// Returns `None` if the key doesn't exist or has expired. Expired entries
    /// found here are removed ("lazy expiry").
    pub fn get_entry(&self, key: &[u8]) -> Option<Entry> {
        let shard = self.get_shard(key);

        // Fast path: read lock for existing, non-expired keys
        {
            let data = shard.data.read().unwrap();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Key exists but is expired - need write lock to remove it
        let mut data = shard.data.write().unwrap();
        if let Some(entry) = data.get(key) {
            if entry.is_expired() {
                if let Some(removed) = data.remove(key) {
                    self.forget(&removed);
                    self.expired_count.fetch_add(1, Ordering::Relaxed);
                }
                return None;
            }
            // Race: another connection may have rewritten the key
            return Some(entry.clone());
        }

        None
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &[u8]) -> bool {
        let shard = self.get_shard(key);
        let data = shard.data.read().unwrap();

        data.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    /// Returns the approximate number of keys in the cache.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns engine statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
            evicted: self.evicted_count.load(Ordering::Relaxed),
            total_cost: self.total_cost.load(Ordering::Relaxed),
        }
    }

    /// Cleans up expired entries from all shards.
    ///
    /// This is called by the background expiry sweeper.
    ///
    /// # Returns
    ///
    /// Returns the number of entries that were cleaned up.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;
        let mut cost = 0u64;

        for shard in &self.shards {
            let mut data = shard.data.write().unwrap();
            data.retain(|_, entry| {
                if entry.is_expired() {
                    cleaned += 1;
                    cost += entry.cost;
                    false
                } else {
                    true
                }
            });
        }

        if cleaned > 0 {
            self.key_count.fetch_sub(cleaned, Ordering::Relaxed);
            self.total_cost.fetch_sub(cost, Ordering::Relaxed);
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }

    #[inline]
    fn over_budget(&self) -> bool {
        self.total_cost.load(Ordering::Relaxed) > self.max_cost
    }

    /// Evicts entries until the total cost fits the budget again.
    ///
    /// Shards are visited round-robin starting at a rotating cursor. Within a
    /// shard, expired entries are purged before live ones are dropped. `keep`
    /// (the key just written) is never evicted.
    fn evict_to_fit(&self, keep: &[u8]) {
        let start = self.evict_cursor.fetch_add(1, Ordering::Relaxed);
        let mut expired = 0u64;
        let mut evicted = 0u64;

        for offset in 0..NUM_SHARDS {
            if !self.over_budget() {
                break;
            }

            let shard = &self.shards[(start + offset) % NUM_SHARDS];
            let mut data = shard.data.write().unwrap();

            let mut cost = 0u64;
            data.retain(|_, entry| {
                if entry.is_expired() {
                    expired += 1;
                    cost += entry.cost;
                    false
                } else {
                    true
                }
            });
            self.total_cost.fetch_sub(cost, Ordering::Relaxed);

            while self.over_budget() {
                let Some(victim) = data.keys().find(|k| &k[..] != keep).cloned() else {
                    break;
                };
                if let Some(removed) = data.remove(&victim) {
                    self.total_cost.fetch_sub(removed.cost, Ordering::Relaxed);
                    evicted += 1;
                }
            }
        }

        let removed = expired + evicted;
        if removed > 0 {
            self.key_count.fetch_sub(removed, Ordering::Relaxed);
            self.expired_count.fetch_add(expired, Ordering::Relaxed);
            self.evicted_count.fetch_add(evicted, Ordering::Relaxed);
            debug!(expired, evicted, "Evicted entries to fit capacity budget");
        }
    }

    /// Updates the counters for an entry that left the map.
    fn forget(&self, entry: &Entry) {
        self.key_count.fetch_sub(1, Ordering::Relaxed);
        self.total_cost.fetch_sub(entry.cost, Ordering::Relaxed);
    }
}

impl Store for StorageEngine {
    fn get(&self, key: &[u8]) -> Option<CacheItem> {
        self.get_entry(key).map(|entry| entry.item)
    }

    fn set_with_ttl(
        &self,
        key: Bytes,
        item: CacheItem,
        cost: u64,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        if item.len() > self.max_item_size {
            return Err(StoreError::TooLarge {
                size: item.len(),
                max: self.max_item_size,
            });
        }

        if cost > self.max_cost {
            return Err(StoreError::OverCapacity {
                cost,
                max: self.max_cost,
            });
        }

        {
            let shard = self.get_shard(&key);
            let mut data = shard.data.write().unwrap();

            match data.insert(key.clone(), Entry::new(item, cost, ttl)) {
                Some(previous) => {
                    self.total_cost.fetch_sub(previous.cost, Ordering::Relaxed);
                }
                None => {
                    self.key_count.fetch_add(1, Ordering::Relaxed);
                }
            }
            self.total_cost.fetch_add(cost, Ordering::Relaxed);
        }

        // Eviction takes other shard locks; the writer's lock is released first
        if self.over_budget() {
            self.evict_to_fit(&key);
        }

        Ok(())
    }

    fn delete(&self, key: &[u8]) -> bool {
        let shard = self.get_shard(key);
        let mut data = shard.data.write().unwrap();

        match data.remove(key) {
            Some(removed) => {
                self.forget(&removed);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(engine: &StorageEngine, key: &str, value: &str, ttl: Option<Duration>) {
        engine
            .set_with_ttl(
                Bytes::from(key.to_string()),
                CacheItem::new(value.to_string(), 0),
                value.len() as u64,
                ttl,
            )
            .unwrap();
    }

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();

        engine
            .set_with_ttl(Bytes::from("key"), CacheItem::new("value", 42), 5, None)
            .unwrap();
        assert_eq!(engine.get(b"key"), Some(CacheItem::new("value", 42)));
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get(b"nonexistent"), None);
    }

    #[test]
    fn test_overwrite_keeps_single_key() {
        let engine = StorageEngine::new();

        put(&engine, "key", "one", None);
        put(&engine, "key", "three", None);

        assert_eq!(engine.len(), 1);
        assert_eq!(engine.stats().total_cost, 5);
        assert_eq!(engine.get(b"key").unwrap().data, Bytes::from("three"));
    }

    #[test]
    fn test_delete() {
        let engine = StorageEngine::new();

        put(&engine, "key", "value", None);
        assert!(engine.delete(b"key"));
        assert_eq!(engine.get(b"key"), None);
        assert!(!engine.delete(b"key")); // Already deleted
        assert_eq!(engine.len(), 0);
        assert_eq!(engine.stats().total_cost, 0);
    }

    #[test]
    fn test_exists() {
        let engine = StorageEngine::new();

        assert!(!engine.exists(b"key"));
        put(&engine, "key", "value", None);
        assert!(engine.exists(b"key"));
    }

    #[test]
    fn test_expiry() {
        let engine = StorageEngine::new();

        put(&engine, "key", "value", Some(Duration::from_millis(50)));

        // Key should exist immediately
        assert!(engine.exists(b"key"));

        std::thread::sleep(Duration::from_millis(100));

        // Key should be gone, and counted as expired
        assert_eq!(engine.get(b"key"), None);
        assert_eq!(engine.len(), 0);
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let engine = StorageEngine::new();

        put(&engine, "key", "value", None);
        assert_eq!(engine.get_entry(b"key").unwrap().expires_at, None);
    }

    #[test]
    fn test_rejects_oversized_item() {
        let engine = StorageEngine::with_max_item_size(4);

        let result = engine.set_with_ttl(Bytes::from("key"), CacheItem::new("12345", 0), 5, None);
        assert_eq!(result, Err(StoreError::TooLarge { size: 5, max: 4 }));
        assert!(engine.is_empty());

        put(&engine, "key", "1234", None);
        assert!(engine.exists(b"key"));
    }

    #[test]
    fn test_cleanup_expired() {
        let engine = StorageEngine::new();

        put(&engine, "key1", "value", Some(Duration::from_millis(10)));
        put(&engine, "key2", "value", Some(Duration::from_millis(10)));
        put(&engine, "key3", "value", None);

        std::thread::sleep(Duration::from_millis(50));

        let cleaned = engine.cleanup_expired();
        assert_eq!(cleaned, 2);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.stats().total_cost, 5);
        assert!(engine.exists(b"key3"));
    }

    #[test]
    fn test_capacity_budget_is_enforced() {
        let engine = StorageEngine::with_limits(DEFAULT_MAX_ITEM_SIZE, 100);

        for i in 0..50 {
            put(&engine, &format!("key{}", i), "0123456789", None);
            assert!(engine.stats().total_cost <= 100);
        }

        let stats = engine.stats();
        assert_eq!(stats.keys, 10);
        assert_eq!(stats.total_cost, 100);
        assert_eq!(stats.evicted, 40);

        // The most recent write always survives
        assert!(engine.exists(b"key49"));
    }

    #[test]
    fn test_eviction_prefers_expired_entries() {
        let engine = StorageEngine::with_limits(DEFAULT_MAX_ITEM_SIZE, 30);

        put(&engine, "stale1", "0123456789", Some(Duration::from_millis(10)));
        put(&engine, "stale2", "0123456789", Some(Duration::from_millis(10)));
        put(&engine, "stale3", "0123456789", Some(Duration::from_millis(10)));

        std::thread::sleep(Duration::from_millis(50));

        put(&engine, "fresh", "0123456789", None);

        // Only expired entries had to go; nothing live was evicted
        let stats = engine.stats();
        assert!(stats.total_cost <= 30);
        assert!(stats.expired >= 1);
        assert_eq!(stats.evicted, 0);
        assert!(engine.exists(b"fresh"));
    }

    #[test]
    fn test_item_over_budget_is_refused() {
        let engine = StorageEngine::with_limits(DEFAULT_MAX_ITEM_SIZE, 4);
        put(&engine, "small", "1234", None);

        let result = engine.set_with_ttl(Bytes::from("big"), CacheItem::new("12345", 0), 5, None);
        assert_eq!(result, Err(StoreError::OverCapacity { cost: 5, max: 4 }));
        assert!(engine.exists(b"small"));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_overwrite_within_budget_evicts_nothing() {
        let engine = StorageEngine::with_limits(DEFAULT_MAX_ITEM_SIZE, 10);

        put(&engine, "key", "0123456789", None);
        put(&engine, "key", "9876543210", None);

        assert_eq!(engine.stats().evicted, 0);
        assert_eq!(engine.get(b"key").unwrap().data, Bytes::from("9876543210"));
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        // Spawn multiple writers
        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    put(&engine, &key, &key, None);
                    assert_eq!(engine.get(key.as_bytes()).unwrap().data, Bytes::from(key));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 1000);
    }
}
