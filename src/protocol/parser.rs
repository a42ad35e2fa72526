//! memcached Text Protocol Parser
//!
//! The parser turns a command line, and for storage verbs the data block that
//! follows it, into a [`Command`].
//!
//! ## How the Parser Works
//!
//! 1. [`read_line`](crate::protocol::frame::read_line) pulls one line off the
//!    buffered connection.
//! 2. [`parse_line`] tokenizes it, picks the verb family and validates arity and
//!    numeric fields. It is a pure function so it can be tested without I/O.
//! 3. Storage verbs then read exactly `<bytes> + 2` more bytes. The first
//!    `<bytes>` become the payload; the two trailing bytes are the terminator.
//!
//! A [`ParseError`] means the client sent something malformed. Everything else
//! that can go wrong (I/O failure, a connection closed mid-command) is a
//! [`ReadError`] and ends the connection without a reply.

use crate::protocol::frame;
use crate::protocol::types::{Command, StorageCommand, StorageVerb};
use bytes::Bytes;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncReadExt};

/// Longest key accepted, in bytes (same as memcached)
pub const MAX_KEY_LENGTH: usize = 250;

/// Largest data block the parser will read for a single command
pub const MAX_DATA_BLOCK: usize = 64 * 1024 * 1024;

/// Initial capacity for data block buffers; larger blocks grow as bytes arrive
const INITIAL_BLOCK_CAPACITY: usize = 16 * 1024;

/// Errors caused by a malformed request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty command line")]
    EmptyLine,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{verb}': expected {expected}, got {got}")]
    WrongArity {
        verb: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("key too long: {len} bytes (max: {max})")]
    KeyTooLong { len: usize, max: usize },

    #[error("command line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    #[error("data block too large: {size} bytes (max: {max})")]
    DataTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors that can occur while reading a request off a connection.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection in the middle of a command
    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

/// The header of a storage command, before its data block is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHeader {
    pub verb: StorageVerb,
    pub key: Bytes,
    pub flags: u32,
    pub exptime: u32,
    /// Declared payload length
    pub bytes: usize,
    pub cas_unique: Option<u64>,
    pub no_reply: bool,
}

impl StorageHeader {
    /// Attaches the payload read from the wire.
    pub fn into_command(self, data: Bytes) -> StorageCommand {
        StorageCommand {
            verb: self.verb,
            key: self.key,
            flags: self.flags,
            exptime: self.exptime,
            data,
            cas_unique: self.cas_unique,
            no_reply: self.no_reply,
        }
    }
}

/// Outcome of parsing a single command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// The line is a whole command
    Complete(Command),
    /// A data block of `header.bytes + 2` bytes must be read next
    NeedsData(StorageHeader),
}

/// Reads commands off a buffered connection.
///
/// The parser owns the line buffer so it is reused across requests.
#[derive(Debug, Default)]
pub struct CommandParser {
    line: Vec<u8>,
}

impl CommandParser {
    pub fn new() -> Self {
        Self {
            line: Vec::with_capacity(256),
        }
    }

    /// Reads the next command.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(command))` - A complete command, data block included
    /// - `Ok(None)` - The client closed the connection between commands
    /// - `Err(e)` - Malformed request or read failure
    pub async fn read_command<R>(&mut self, reader: &mut R) -> Result<Option<Command>, ReadError>
    where
        R: AsyncBufRead + Unpin,
    {
        if !frame::read_line(reader, &mut self.line).await? {
            return Ok(None);
        }

        match parse_line(&self.line)? {
            ParsedLine::Complete(command) => Ok(Some(command)),
            ParsedLine::NeedsData(header) => {
                let data = read_data_block(reader, header.bytes).await?;
                Ok(Some(Command::Storage(header.into_command(data))))
            }
        }
    }
}

/// Parses a command line (terminator already stripped).
pub fn parse_line(line: &[u8]) -> ParseResult<ParsedLine> {
    let tokens: Vec<&[u8]> = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .collect();

    let verb = match tokens.first() {
        Some(verb) => *verb,
        None => return Err(ParseError::EmptyLine),
    };

    if let Some(storage_verb) = StorageVerb::from_token(verb) {
        return parse_storage(storage_verb, &tokens).map(ParsedLine::NeedsData);
    }

    if verb.eq_ignore_ascii_case(b"get") {
        if tokens.len() != 2 {
            return Err(ParseError::WrongArity {
                verb: "get",
                expected: 2,
                got: tokens.len(),
            });
        }
        let key = parse_key(tokens[1])?;
        return Ok(ParsedLine::Complete(Command::Get { key }));
    }

    if verb.eq_ignore_ascii_case(b"delete") {
        if tokens.len() < 2 {
            return Err(ParseError::WrongArity {
                verb: "delete",
                expected: 2,
                got: tokens.len(),
            });
        }
        let key = parse_key(tokens[1])?;
        let no_reply = is_noreply(tokens.get(2));
        return Ok(ParsedLine::Complete(Command::Delete { key, no_reply }));
    }

    Err(ParseError::UnknownCommand(
        String::from_utf8_lossy(verb).into_owned(),
    ))
}

/// `<verb> <key> <flags> <exptime> <bytes> [<cas unique>] [noreply]`
fn parse_storage(verb: StorageVerb, tokens: &[&[u8]]) -> ParseResult<StorageHeader> {
    let min = verb.min_tokens();
    if tokens.len() < min {
        return Err(ParseError::WrongArity {
            verb: verb.as_str(),
            expected: min,
            got: tokens.len(),
        });
    }

    let key = parse_key(tokens[1])?;
    let flags = parse_number::<u32>(tokens[2], "flags")?;
    let exptime = parse_number::<u32>(tokens[3], "exptime")?;
    let bytes = parse_number::<usize>(tokens[4], "bytes")?;

    if bytes > MAX_DATA_BLOCK {
        return Err(ParseError::DataTooLarge {
            size: bytes,
            max: MAX_DATA_BLOCK,
        });
    }

    let cas_unique = match verb {
        StorageVerb::Cas => Some(parse_number::<u64>(tokens[5], "cas unique")?),
        _ => None,
    };

    Ok(StorageHeader {
        verb,
        key,
        flags,
        exptime,
        bytes,
        cas_unique,
        no_reply: is_noreply(tokens.get(min)),
    })
}

fn parse_key(token: &[u8]) -> ParseResult<Bytes> {
    if token.len() > MAX_KEY_LENGTH {
        return Err(ParseError::KeyTooLong {
            len: token.len(),
            max: MAX_KEY_LENGTH,
        });
    }
    Ok(Bytes::copy_from_slice(token))
}

fn parse_number<T: FromStr>(token: &[u8], field: &'static str) -> ParseResult<T> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::InvalidNumber {
            field,
            value: String::from_utf8_lossy(token).into_owned(),
        })
}

#[inline]
fn is_noreply(token: Option<&&[u8]>) -> bool {
    matches!(token, Some(t) if *t == b"noreply")
}

/// Reads `len` payload bytes plus the two-byte terminator.
///
/// The terminator is consumed but its content is not checked; any two bytes
/// are accepted.
async fn read_data_block<R>(reader: &mut R, len: usize) -> Result<Bytes, ReadError>
where
    R: AsyncBufRead + Unpin,
{
    let expected = len + 2;
    let mut block = Vec::with_capacity(expected.min(INITIAL_BLOCK_CAPACITY));

    let n = (&mut *reader)
        .take(expected as u64)
        .read_to_end(&mut block)
        .await?;
    if n < expected {
        return Err(ReadError::UnexpectedEof);
    }

    block.truncate(len);
    Ok(Bytes::from(block))
}

/// Helper function to read a single command from a byte slice.
///
/// This is a convenience function for tests and benchmarks.
pub async fn parse_command(mut input: &[u8]) -> Result<Option<Command>, ReadError> {
    CommandParser::new().read_command(&mut input).await
}
