//! memcached Text Protocol Implementation
//!
//! This module implements the request side and the reply side of the
//! memcached text protocol subset FlashCache speaks.
//!
//! ## Modules
//!
//! - `frame`: Reads one command line off a buffered connection
//! - `parser`: Turns a command line plus data block into a `Command`
//! - `types`: Defines `Command`, `Response` and their wire format
//!
//! ## Example
//!
//! ```
//! use flashcache::protocol::{parse_line, Command, ParsedLine, Response};
//! use bytes::Bytes;
//!
//! // Parsing a retrieval line
//! let parsed = parse_line(b"get name").unwrap();
//! assert_eq!(
//!     parsed,
//!     ParsedLine::Complete(Command::Get { key: Bytes::from("name") })
//! );
//!
//! // Creating responses
//! let reply = Response::Value {
//!     key: Bytes::from("name"),
//!     flags: 0,
//!     data: Bytes::from("Ariz"),
//! };
//! assert_eq!(reply.serialize(), b"VALUE name 0 4\r\nAriz\r\nEND\r\n");
//! ```

pub mod frame;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use frame::{read_line, MAX_LINE_LENGTH};
pub use parser::{
    parse_command, parse_line, CommandParser, ParseError, ParseResult, ParsedLine, ReadError,
    StorageHeader, MAX_DATA_BLOCK, MAX_KEY_LENGTH,
};
pub use types::{Command, Response, StorageCommand, StorageVerb};
