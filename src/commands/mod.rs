//! Command Handler Module
//!
//! This module implements the command processing layer for FlashCache.
//! It receives parsed commands, executes them against the store,
//! and returns appropriate replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandParser   │  (protocol module)
//! └────────┬────────┘
//!          │ Command
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │ get / set_with_ttl / delete
//!          ▼
//! ┌─────────────────┐
//! │ dyn Store       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - Storage: `set`, `add`, `replace`, `append`, `prepend`, `cas`
//! - Retrieval: `get` (single key)
//! - Deletion: `delete`

pub mod handler;

pub use handler::{ttl_from_exptime, CommandHandler, CAS_DEFAULT_TTL};
