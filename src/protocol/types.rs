//! memcached Text Protocol Data Types
//!
//! This module defines the parsed request ([`Command`]) and the reply
//! ([`Response`]) of the memcached text protocol.
//!
//! ## Protocol Format
//!
//! Every request starts with a single command line. Storage commands are
//! followed by a data block of exactly `<bytes>` bytes plus a terminator:
//!
//! ```text
//! set <key> <flags> <exptime> <bytes> [noreply]\r\n
//! <data block>\r\n
//! cas <key> <flags> <exptime> <bytes> <cas unique> [noreply]\r\n
//! get <key>\r\n
//! delete <key> [noreply]\r\n
//! ```
//!
//! Replies are single lines, except for a retrieval hit:
//!
//! ```text
//! VALUE <key> <flags> <bytes>\r\n
//! <data block>\r\n
//! END\r\n
//! ```

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in the text protocol
pub const CRLF: &[u8] = b"\r\n";

/// The verbs that write or mutate a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageVerb {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
}

impl StorageVerb {
    /// Looks up a storage verb, ignoring ASCII case.
    pub fn from_token(token: &[u8]) -> Option<Self> {
        const VERBS: [(&[u8], StorageVerb); 6] = [
            (b"set", StorageVerb::Set),
            (b"add", StorageVerb::Add),
            (b"replace", StorageVerb::Replace),
            (b"append", StorageVerb::Append),
            (b"prepend", StorageVerb::Prepend),
            (b"cas", StorageVerb::Cas),
        ];

        VERBS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|(_, verb)| *verb)
    }

    /// Number of tokens the command line must carry, verb included.
    pub fn min_tokens(self) -> usize {
        match self {
            StorageVerb::Cas => 6,
            _ => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StorageVerb::Set => "set",
            StorageVerb::Add => "add",
            StorageVerb::Replace => "replace",
            StorageVerb::Append => "append",
            StorageVerb::Prepend => "prepend",
            StorageVerb::Cas => "cas",
        }
    }
}

impl fmt::Display for StorageVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A storage request together with its data block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCommand {
    pub verb: StorageVerb,
    pub key: Bytes,
    pub flags: u32,
    /// Expiry in seconds; 0 means no expiry
    pub exptime: u32,
    /// The payload, exactly `<bytes>` long (terminator stripped)
    pub data: Bytes,
    /// Only present for `cas`
    pub cas_unique: Option<u64>,
    pub no_reply: bool,
}

/// A fully parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Storage(StorageCommand),
    Get { key: Bytes },
    Delete { key: Bytes, no_reply: bool },
}

impl Command {
    /// Lowercase verb name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Storage(cmd) => cmd.verb.as_str(),
            Command::Get { .. } => "get",
            Command::Delete { .. } => "delete",
        }
    }

    pub fn key(&self) -> &Bytes {
        match self {
            Command::Storage(cmd) => &cmd.key,
            Command::Get { key } | Command::Delete { key, .. } => key,
        }
    }

    /// Returns true if the client asked for the reply to be suppressed.
    pub fn no_reply(&self) -> bool {
        match self {
            Command::Storage(cmd) => cmd.no_reply,
            Command::Get { .. } => false,
            Command::Delete { no_reply, .. } => *no_reply,
        }
    }
}

/// A reply sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Stored,
    NotStored,
    NotFound,
    Deleted,
    /// Unknown or malformed command
    Error,
    /// The server failed to carry out a well-formed command
    ServerError(String),
    /// Retrieval hit: the `VALUE` line, the data block and `END`
    Value { key: Bytes, flags: u32, data: Bytes },
    /// Retrieval miss
    End,
}

impl Response {
    pub fn server_error(msg: impl Into<String>) -> Self {
        Response::ServerError(msg.into())
    }

    /// Returns true for replies that report a failure.
    ///
    /// These are written even when `noreply` was requested.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error | Response::ServerError(_))
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Response::Stored => buf.extend_from_slice(b"STORED"),
            Response::NotStored => buf.extend_from_slice(b"NOT_STORED"),
            Response::NotFound => buf.extend_from_slice(b"NOT_FOUND"),
            Response::Deleted => buf.extend_from_slice(b"DELETED"),
            Response::Error => buf.extend_from_slice(b"ERROR"),
            Response::ServerError(msg) => {
                buf.extend_from_slice(b"SERVER_ERROR ");
                buf.extend_from_slice(msg.as_bytes());
            }
            Response::Value { key, flags, data } => {
                buf.reserve(key.len() + data.len() + 32);
                buf.extend_from_slice(b"VALUE ");
                buf.extend_from_slice(key);
                buf.extend_from_slice(format!(" {} {}", flags, data.len()).as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(b"END");
            }
            Response::End => buf.extend_from_slice(b"END"),
        }
        buf.extend_from_slice(CRLF);
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Stored => write!(f, "STORED"),
            Response::NotStored => write!(f, "NOT_STORED"),
            Response::NotFound => write!(f, "NOT_FOUND"),
            Response::Deleted => write!(f, "DELETED"),
            Response::Error => write!(f, "ERROR"),
            Response::ServerError(msg) => write!(f, "SERVER_ERROR {}", msg),
            Response::Value { key, flags, data } => write!(
                f,
                "VALUE {} {} {}",
                String::from_utf8_lossy(key),
                flags,
                data.len()
            ),
            Response::End => write!(f, "END"),
        }
    }
}
