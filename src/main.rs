//! FlashCache - A memcached-Compatible In-Memory Cache Server
//!
//! This is the main entry point for the FlashCache server.
//! It parses the command line, sets up the storage engine, the health check
//! and the TCP listener, and runs until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use flashcache::config::{Cli, CliCommand, ServerConfig};
use flashcache::connection::ConnectionStats;
use flashcache::storage::{start_expiry_sweeper, StorageEngine};
use flashcache::{health, server};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
FlashCache v{} - memcached-compatible In-Memory Cache
──────────────────────────────────────────────────────
Cache server on   {}
Health check on   http://{}/healthz
Max item size     {} bytes
Capacity budget   {} bytes

Use Ctrl+C to shutdown gracefully.
"#,
        flashcache::VERSION,
        config.bind_address(),
        config.health_address(),
        config.max_item_size,
        config.max_cost
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(CliCommand::Version) = cli.command {
        println!("flashcache version {}", flashcache::VERSION);
        return Ok(());
    }

    let config = cli.config();

    // Set up logging (RUST_LOG overrides the default level)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::with_limits(
        config.max_item_size,
        config.max_cost,
    ));
    info!(
        max_item_size = config.max_item_size,
        max_cost = config.max_cost,
        "Storage engine initialized"
    );

    let _sweeper = start_expiry_sweeper(Arc::clone(&storage));

    let stats = Arc::new(ConnectionStats::new());

    // The health check runs independently of the cache listener
    let health_listener = TcpListener::bind(config.health_address())
        .await
        .with_context(|| format!("failed to bind health check on {}", config.health_address()))?;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_listener).await {
            error!("Health check server failed: {}", e);
        }
    });

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("Listening on {}", config.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = server::accept_loop(listener, storage.clone(), Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    let store_stats = storage.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        parse_errors = stats.parse_errors.load(Ordering::Relaxed),
        keys = store_stats.keys,
        expired = store_stats.expired,
        evicted = store_stats.evicted,
        total_cost = store_stats.total_cost,
        "Server shutdown complete"
    );
    Ok(())
}
