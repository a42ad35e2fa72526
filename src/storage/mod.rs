//! Storage Module
//!
//! The key-value store behind the protocol layer. The dispatcher only sees the
//! [`Store`] trait; [`StorageEngine`] is the in-process implementation used by
//! the server binary.
//!
//! ## Architecture
//!
//! ```text
//!        CommandHandler
//!              │  Store::get / set_with_ttl / delete
//!              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use flashcache::storage::{CacheItem, StorageEngine, Store};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine
//!     .set_with_ttl(
//!         Bytes::from("session"),
//!         CacheItem::new("token123", 0),
//!         8,
//!         Some(Duration::from_secs(3600)),
//!     )
//!     .unwrap();
//!
//! let item = engine.get(b"session").unwrap();
//! assert_eq!(item.data, Bytes::from("token123"));
//! ```

pub mod engine;
pub mod expiry;
pub mod store;

pub use engine::{Entry, StorageEngine, StorageStats, DEFAULT_MAX_COST, DEFAULT_MAX_ITEM_SIZE};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use store::{CacheItem, Store, StoreError};
