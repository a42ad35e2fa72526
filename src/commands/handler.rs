//! Command Handler Module
//!
//! This module implements the per-verb semantics of FlashCache. It receives
//! parsed [`Command`]s, executes them against the [`Store`], and returns the
//! [`Response`] to send back.
//!
//! ## Verb Semantics
//!
//! | Verb      | Precondition | Reply on success | Otherwise    |
//! |-----------|--------------|------------------|--------------|
//! | `set`     | none         | `STORED`         |              |
//! | `add`     | key absent   | `STORED`         | `NOT_STORED` |
//! | `replace` | key present  | `STORED`         | `NOT_STORED` |
//! | `append`  | key present  | `STORED`         | `NOT_STORED` |
//! | `prepend` | key present  | `STORED`         | `NOT_STORED` |
//! | `cas`     | key present  | `STORED`         | `NOT_FOUND`  |
//! | `get`     | none         | `VALUE ... END`  | `END`        |
//! | `delete`  | none         | `DELETED`        |              |
//!
//! A store that refuses a write turns any storage verb into
//! `SERVER_ERROR <reason>`.
//!
//! ## Expiry
//!
//! `exptime` is a number of seconds from now; `0` stores the item without
//! expiry. `cas` is the exception: an `exptime` of `0` gives the item a
//! 30 second TTL.

use crate::protocol::{Command, Response, StorageCommand, StorageVerb};
use crate::storage::{CacheItem, Store};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// TTL given to `cas` writes that don't specify an expiry
pub const CAS_DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Executes parsed commands against a store.
///
/// Cloning is cheap; every connection gets its own handle to the shared store.
#[derive(Clone)]
pub struct CommandHandler {
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler").finish_non_exhaustive()
    }
}

impl CommandHandler {
    /// Creates a new command handler backed by `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Executes a command and returns the reply.
    ///
    /// The reply is returned even for `noreply` commands; suppressing it is
    /// the connection's job.
    pub fn execute(&self, command: Command) -> Response {
        match command {
            Command::Storage(cmd) => self.dispatch(cmd),
            Command::Get { key } => self.cmd_get(key),
            Command::Delete { key, .. } => self.cmd_delete(&key),
        }
    }

    /// Dispatches a storage command to its handler.
    fn dispatch(&self, cmd: StorageCommand) -> Response {
        match cmd.verb {
            StorageVerb::Set => self.cmd_set(cmd),
            StorageVerb::Add => self.cmd_add(cmd),
            StorageVerb::Replace => self.cmd_replace(cmd),
            StorageVerb::Append | StorageVerb::Prepend => self.cmd_concat(cmd),
            StorageVerb::Cas => self.cmd_cas(cmd),
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    /// Writes an item and maps the store's verdict to a reply.
    fn store_item(&self, key: Bytes, item: CacheItem, ttl: Option<Duration>) -> Response {
        let cost = item.len() as u64;
        match self.store.set_with_ttl(key.clone(), item, cost, ttl) {
            Ok(()) => Response::Stored,
            Err(e) => {
                warn!(key = %String::from_utf8_lossy(&key), error = %e, "Store rejected write");
                Response::server_error(e.to_string())
            }
        }
    }

    // ========================================================================
    // Storage Commands
    // ========================================================================

    /// set <key> <flags> <exptime> <bytes> [noreply]
    fn cmd_set(&self, cmd: StorageCommand) -> Response {
        let ttl = ttl_from_exptime(cmd.exptime);
        self.store_item(cmd.key, CacheItem::new(cmd.data, cmd.flags), ttl)
    }

    /// add <key> <flags> <exptime> <bytes> [noreply]
    fn cmd_add(&self, cmd: StorageCommand) -> Response {
        if self.store.get(&cmd.key).is_some() {
            return Response::NotStored;
        }
        self.cmd_set(cmd)
    }

    /// replace <key> <flags> <exptime> <bytes> [noreply]
    fn cmd_replace(&self, cmd: StorageCommand) -> Response {
        if self.store.get(&cmd.key).is_none() {
            return Response::NotStored;
        }
        self.cmd_set(cmd)
    }

    /// append|prepend <key> <flags> <exptime> <bytes> [noreply]
    ///
    /// Flags and expiry are taken from the command, not kept from the
    /// existing item.
    fn cmd_concat(&self, cmd: StorageCommand) -> Response {
        let existing = match self.store.get(&cmd.key) {
            Some(item) => item,
            None => return Response::NotStored,
        };

        let (head, tail) = match cmd.verb {
            StorageVerb::Prepend => (&cmd.data, &existing.data),
            _ => (&existing.data, &cmd.data),
        };
        let mut data = BytesMut::with_capacity(head.len() + tail.len());
        data.extend_from_slice(head);
        data.extend_from_slice(tail);

        let ttl = ttl_from_exptime(cmd.exptime);
        self.store_item(cmd.key, CacheItem::new(data.freeze(), cmd.flags), ttl)
    }

    /// cas <key> <flags> <exptime> <bytes> <cas unique> [noreply]
    ///
    /// The cas unique value is not compared; the write succeeds whenever the
    /// key exists. Zero flags and an empty payload keep the existing values.
    fn cmd_cas(&self, cmd: StorageCommand) -> Response {
        let existing = match self.store.get(&cmd.key) {
            Some(item) => item,
            None => return Response::NotFound,
        };

        let flags = if cmd.flags == 0 {
            existing.flags
        } else {
            cmd.flags
        };
        let data = if cmd.data.is_empty() {
            existing.data
        } else {
            cmd.data
        };
        let ttl = match cmd.exptime {
            0 => CAS_DEFAULT_TTL,
            secs => Duration::from_secs(u64::from(secs)),
        };

        self.store_item(cmd.key, CacheItem::new(data, flags), Some(ttl))
    }

    // ========================================================================
    // Retrieval and Deletion
    // ========================================================================

    /// get <key>
    fn cmd_get(&self, key: Bytes) -> Response {
        match self.store.get(&key) {
            Some(item) => Response::Value {
                key,
                flags: item.flags,
                data: item.data,
            },
            None => Response::End,
        }
    }

    /// delete <key> [noreply]
    ///
    /// Replies `DELETED` whether or not the key existed.
    fn cmd_delete(&self, key: &[u8]) -> Response {
        self.store.delete(key);
        Response::Deleted
    }
}

/// Converts a protocol `exptime` into a store TTL. Zero means no expiry.
pub fn ttl_from_exptime(exptime: u32) -> Option<Duration> {
    match exptime {
        0 => None,
        secs => Some(Duration::from_secs(u64::from(secs))),
    }
}
