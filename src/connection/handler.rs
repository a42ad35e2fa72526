//! Connection Handler Module
//!
//! This module handles individual client connections to FlashCache.
//! Each client gets its own handler task that runs in a loop,
//! reading commands and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read line (+ data block)│ │
//!    │  └───────────┬─────────────┘ │
//!    │              │  parse error ─┼──> send ERROR, close
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute command         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send reply (unless      │ │
//!    │  │ noreply)                │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / error
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! The protocol is strictly request/reply: a command is fully executed and
//! its reply flushed before the next one is read.

use crate::commands::CommandHandler;
use crate::protocol::{CommandParser, ParseError, ReadError, Response};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Read buffer capacity; comfortably larger than the longest command line
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Commands rejected by the parser
    pub parse_errors: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// Buffered read half; command lines and data blocks are read from here
    reader: BufReader<OwnedReadHalf>,

    /// Buffered write half
    writer: BufWriter<OwnedWriteHalf>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Command parser (owns the reusable line buffer)
    parser: CommandParser,

    /// The command handler (shares the store with other connections)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        let (read_half, write_half) = stream.into_split();

        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, read_half),
            writer: BufWriter::new(write_half),
            addr,
            parser: CommandParser::new(),
            command_handler,
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Reads commands and sends back replies until the client disconnects,
    /// sends a malformed command, or an I/O error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed with error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let command = match self.parser.read_command(&mut self.reader).await {
                Ok(Some(command)) => command,
                Ok(None) => return Ok(()),
                Err(ReadError::Parse(e)) => {
                    // Fail fast: no attempt to find the next valid line
                    self.stats.parse_error();
                    self.send_response(&Response::Error).await?;
                    return Err(ConnectionError::ParseError(e));
                }
                Err(e) => return Err(e.into()),
            };

            trace!(
                client = %self.addr,
                command = command.name(),
                key = %String::from_utf8_lossy(command.key()),
                "Parsed command"
            );

            let no_reply = command.no_reply();
            let response = self.command_handler.execute(command);
            self.stats.command_processed();

            // Errors are reported even when the client asked for silence
            if !no_reply || response.is_error() {
                self.send_response(&response).await?;
            }
        }
    }

    /// Sends a reply to the client.
    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed command; `ERROR` was sent before closing
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Connection closed in the middle of a command or data block
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

impl From<ReadError> for ConnectionError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Io(e) => ConnectionError::IoError(e),
            ReadError::UnexpectedEof => ConnectionError::UnexpectedEof,
            ReadError::Parse(e) => ConnectionError::ParseError(e),
        }
    }
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion. Failures are logged, never propagated, so one
/// broken client cannot disturb the accept loop.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}
