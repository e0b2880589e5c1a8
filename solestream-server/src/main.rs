// SoleStream Server - HTTP/WebSocket front end for the telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # SoleStream Server
//!
//! Runs the telemetry engine and exposes it over HTTP, WebSocket and a
//! Prometheus endpoint.
//!
//! ## Usage
//!
//! ```bash
//! # Simulated insole on the default port
//! solestream-server
//!
//! # Faster ticks, a config file and a known wireless insole
//! solestream-server --tick-ms 20 --config insole.json \
//!     --wireless-peer "ESP32-Insole=192.168.4.1:8080"
//! ```

mod api;
mod metrics;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use solestream::{Engine, EngineConfig, SystemTransports, TelemetryError, WirelessPeer};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use api::AppState;

/// SoleStream telemetry server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// JSON engine configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tick interval in milliseconds (overrides the config file)
    #[arg(short, long)]
    tick_ms: Option<u64>,

    /// Serial baud rate (overrides the config file)
    #[arg(short, long)]
    baud_rate: Option<u32>,

    /// Wireless peer as NAME=HOST:PORT (repeatable)
    #[arg(short, long = "wireless-peer")]
    wireless_peer: Vec<String>,

    /// Seed for simulated sensor noise
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Startup errors.
#[derive(Debug, Error)]
enum ServerError {
    #[error(transparent)]
    Engine(#[from] TelemetryError),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("SoleStream Server v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ServerError> {
    let config = load_config(&args)?;
    let transports = Arc::new(SystemTransports::from_config(&config));
    let engine = Engine::spawn(config, transports)?;

    let app = api::router(AppState::new(engine.clone()));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting server on http://{}", addr);
    info!("Telemetry stream: ws://{}/ws", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Build the engine configuration: file first, then command-line overrides.
fn load_config(args: &Args) -> Result<EngineConfig, ServerError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
        // Keep the read poll below the tick
        config.read_poll_timeout_ms = config.read_poll_timeout_ms.min(tick_ms.saturating_sub(1));
    }
    if let Some(baud_rate) = args.baud_rate {
        config.serial.baud_rate = baud_rate;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    for spec in &args.wireless_peer {
        config.wireless.peers.push(parse_peer(spec)?);
    }

    config.validate()?;
    Ok(config)
}

/// Parse `NAME=HOST:PORT`.
fn parse_peer(spec: &str) -> Result<WirelessPeer, ServerError> {
    match spec.split_once('=') {
        Some((name, address)) if !name.trim().is_empty() && address.contains(':') => {
            Ok(WirelessPeer::new(name.trim(), address.trim()))
        }
        _ => Err(ServerError::Argument(format!(
            "wireless peer must be NAME=HOST:PORT, got {:?}",
            spec
        ))),
    }
}
