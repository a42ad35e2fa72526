//! # FlashCache - A memcached-Compatible In-Memory Cache Server
//!
//! FlashCache speaks the line-oriented memcached text protocol over TCP.
//! It is built around a small protocol core (line framing, command parsing,
//! per-verb dispatch, connection loop) sitting on top of a pluggable store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             FlashCache                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │ dyn Store               │
//! │                            ▼                  ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │  Command    │    │              StorageEngine                   │   │
//! │  │  Parser     │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │ (text proto)│    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │   │
//! │  └─────────────┘    │  └────────┘ └────────┘ └────────┘ └────────┘ │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │  ┌─────────────┐    ┌─────────────────────────┴───────────────────────┐ │
//! │  │ /healthz    │    │           ExpirySweeper                         │ │
//! │  │ (axum)      │    │      (Background Tokio Task)                    │ │
//! │  └─────────────┘    └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flashcache::connection::ConnectionStats;
//! use flashcache::server::accept_loop;
//! use flashcache::storage::{start_expiry_sweeper, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:11211").await.unwrap();
//!     accept_loop(listener, storage, stats).await;
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `set|add|replace|append|prepend <key> <flags> <exptime> <bytes> [noreply]`
//! - `cas <key> <flags> <exptime> <bytes> <cas unique> [noreply]`
//! - `get <key>`
//! - `delete <key> [noreply]`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Line framing, command parser and reply types
//! - [`commands`]: Per-verb semantics against the store
//! - [`connection`]: Client connection loop
//! - [`storage`]: The `Store` trait and the sharded in-memory engine
//! - [`server`]: TCP accept loop
//! - [`health`]: HTTP health check
//! - [`config`]: Server configuration and command line
//!
//! ## Failure Model
//!
//! A malformed command is answered with `ERROR` and the connection is closed;
//! there is no attempt to resynchronize on the next line. A short data block
//! or an I/O error closes the connection silently. Neither affects other
//! connections or the accept loop.

pub mod commands;
pub mod config;
pub mod connection;
pub mod health;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Cli, CliCommand, ServerConfig};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Command, CommandParser, ParseError, Response};
pub use storage::{start_expiry_sweeper, CacheItem, ExpiryConfig, StorageEngine, Store};

/// The default port FlashCache listens on (same as memcached)
pub const DEFAULT_PORT: u16 = 11211;

/// The default host FlashCache binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default host of the HTTP health check (all interfaces, for external probes)
pub const DEFAULT_HEALTH_HOST: &str = "0.0.0.0";

/// The default port of the HTTP health check
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Version of FlashCache
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
