//! Server Configuration
//!
//! [`ServerConfig`] holds everything the binary needs to start the server.
//! It is usually built from the command line through [`Cli`].

use crate::storage::{DEFAULT_MAX_COST, DEFAULT_MAX_ITEM_SIZE};
use crate::{DEFAULT_HEALTH_HOST, DEFAULT_HEALTH_PORT, DEFAULT_HOST, DEFAULT_PORT};
use clap::{Parser, Subcommand};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host the cache listener binds to
    pub host: String,
    /// Cache protocol port
    pub port: u16,
    /// Host the HTTP health check binds to
    pub health_host: String,
    /// HTTP health check port
    pub health_port: u16,
    /// Largest payload the store accepts
    pub max_item_size: usize,
    /// Capacity budget of the store, in bytes of payload
    pub max_cost: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            health_host: DEFAULT_HEALTH_HOST.to_string(),
            health_port: DEFAULT_HEALTH_PORT,
            max_item_size: DEFAULT_MAX_ITEM_SIZE,
            max_cost: DEFAULT_MAX_COST,
        }
    }
}

impl ServerConfig {
    /// Returns the cache bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the health check bind address as a string
    pub fn health_address(&self) -> String {
        format!("{}:{}", self.health_host, self.health_port)
    }
}

/// FlashCache - a memcached-compatible in-memory cache server
#[derive(Parser, Debug)]
#[command(name = "flashcache")]
#[command(about = "A memcached-compatible in-memory cache server")]
#[command(version)]
pub struct Cli {
    /// Port to run the cache server on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Host for the HTTP health check
    #[arg(long, default_value = DEFAULT_HEALTH_HOST)]
    pub health_host: String,

    /// Port for the HTTP health check (GET /healthz)
    #[arg(long, default_value_t = DEFAULT_HEALTH_PORT)]
    pub health_port: u16,

    /// Largest accepted item, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_ITEM_SIZE)]
    pub max_item_size: usize,

    /// Capacity budget in bytes; older entries are evicted past it
    #[arg(long, default_value_t = DEFAULT_MAX_COST)]
    pub max_cost: u64,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Print the version number
    Version,
}

impl Cli {
    pub fn config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            health_host: self.health_host.clone(),
            health_port: self.health_port,
            max_item_size: self.max_item_size,
            max_cost: self.max_cost,
        }
    }
}
