//! # Beacon Server
//!
//! Main entry point for the Beacon CI workflow relay.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! beacon-server
//!
//! # Run with custom configuration file
//! beacon-server --config /path/to/config.yaml
//!
//! # Run with environment variable overrides
//! BEACON_API_PORT=9090 BEACON_WEBHOOK_SECRET=s3cret beacon-server
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use beacon_server::{BeaconServer, ServerConfig};
use beacon_server::logging::init_logging;

/// Beacon CI workflow relay
#[derive(Parser, Debug)]
#[command(name = "beacon-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override server host
    #[arg(long, env = "BEACON_API_HOST")]
    host: Option<String>,

    /// Override server port
    #[arg(long, env = "BEACON_API_PORT")]
    port: Option<u16>,

    /// Override database path
    #[arg(long, env = "BEACON_STORAGE_PATH")]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if args.validate {
        println!("Configuration is valid");
        return;
    }

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    info!("Beacon {} starting", env!("CARGO_PKG_VERSION"));

    match BeaconServer::new(config).run().await {
        Ok(()) => {
            info!("Beacon server stopped");
        }
        Err(e) => {
            error!("Server error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Loads configuration from file and applies overrides.
fn load_config(args: &Args) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        ServerConfig::load(&args.config)?
    } else {
        eprintln!(
            "Configuration file not found: {}, using defaults",
            args.config.display()
        );
        let mut config = ServerConfig::default();
        config.apply_env_overrides();
        config
    };

    // Apply command-line overrides
    if let Some(host) = &args.host {
        config.api.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(database) = &args.database {
        config.storage.path.clone_from(database);
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}
