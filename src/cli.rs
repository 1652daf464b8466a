//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Catalog Gateway - authenticated routing layer for data-catalog operations
#[derive(Parser, Debug)]
#[command(name = "catalog-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CATALOG_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CATALOG_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "CATALOG_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "CATALOG_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CATALOG_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Mint a signed development JWT for local testing
    Token {
        /// Subject (caller identity) to embed in the token
        #[arg(long, default_value = "dev@localhost")]
        sub: String,

        /// Catalog bearer token to embed (required: without one every
        /// catalog operation is guaranteed to fail)
        #[arg(long, required = true)]
        catalog_token: String,

        /// Catalog UI URL claim
        #[arg(long)]
        catalog_url: Option<String>,

        /// Registry API URL claim
        #[arg(long)]
        registry_url: Option<String>,

        /// Role ARN claim for scoped cloud access
        #[arg(long)]
        role_arn: Option<String>,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
}
