//! TCP Accept Loop
//!
//! Accepts cache clients and gives each one its own task. Accepting is
//! unbounded; a failed `accept` is logged and the loop carries on.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::Store;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, trace};

/// Accepts connections forever, spawning a handler task for each.
pub async fn accept_loop(
    listener: TcpListener,
    store: Arc<dyn Store>,
    stats: Arc<ConnectionStats>,
) {
    let handler = CommandHandler::new(store);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                trace!(client = %addr, "Accepted connection");
                let handler = handler.clone();
                let stats = Arc::clone(&stats);

                tokio::spawn(handle_connection(stream, addr, handler, stats));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
