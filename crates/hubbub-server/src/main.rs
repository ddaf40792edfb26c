//! # Hubbub Server
//!
//! Realtime chat, push-stream and signaling hub.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! hubbub
//!
//! # Run with custom config
//! hubbub --config /path/to/hubbub.toml
//!
//! # Run with environment variables
//! HUBBUB_PORT=8000 HUBBUB_HOST=0.0.0.0 HUBBUB_SSE__KEEPALIVE_MS=10000 hubbub
//! ```

mod api;
mod chat;
mod config;
mod handlers;
mod metrics;
mod push;
mod registration;
mod signal;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "hubbub", version, about = "Realtime chat, push-stream and signaling hub")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "HUBBUB_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hubbub=debug,hubbub_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load(args.config.as_deref())?;

    tracing::info!("Starting hubbub on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
