//! Store Capability Boundary
//!
//! The protocol layer never touches the storage engine directly. Everything it
//! needs is expressed by the [`Store`] trait: a lookup, an upsert with an
//! optional TTL, and a delete. Expiry timing, capacity accounting and
//! concurrency are the implementor's business.
//!
//! Values crossing the boundary are [`CacheItem`]s, so a stored value always has
//! the shape the dispatcher expects.

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// A cached value: the opaque payload plus the client-supplied flags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheItem {
    /// Raw payload bytes
    pub data: Bytes,
    /// Opaque 32-bit value echoed back on retrieval
    pub flags: u32,
}

impl CacheItem {
    pub fn new(data: impl Into<Bytes>, flags: u32) -> Self {
        Self {
            data: data.into(),
            flags,
        }
    }

    /// Size of the payload in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Reasons a store may refuse a write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The item exceeds the per-item size limit
    #[error("object too large for cache")]
    TooLarge { size: usize, max: usize },

    /// The item's cost alone exceeds the store's capacity budget
    #[error("out of memory storing object")]
    OverCapacity { cost: u64, max: u64 },
}

/// The operations the command dispatcher relies on.
///
/// Each call must be individually atomic, and a completed `set_with_ttl` or
/// `delete` must be visible to any later `get` from any connection.
pub trait Store: Send + Sync + 'static {
    /// Looks up a live (non-expired) item.
    fn get(&self, key: &[u8]) -> Option<CacheItem>;

    /// Inserts or overwrites `key`.
    ///
    /// `cost` is a capacity hint interpreted by the store. A `ttl` of `None`
    /// means the item never expires.
    fn set_with_ttl(
        &self,
        key: Bytes,
        item: CacheItem,
        cost: u64,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Removes `key`, returning whether it was present.
    fn delete(&self, key: &[u8]) -> bool;
}
