//! wsb-server: WebSocket-to-TCP bridge.
//!
//! Accepts WebSocket connections and pairs each one with its own TCP
//! connection to a fixed backend, relaying payloads in both directions.

mod bridge;
mod config;
mod transport;

use bridge::BridgeEngine;
use clap::Parser;
use config::{BridgeConfig, CliOverrides};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// wsb-server — WebSocket-to-TCP bridge
#[derive(Parser, Debug)]
#[command(name = "wsb-server", version, about = "WebSocket-to-TCP bridge")]
struct Cli {
    /// Front-end listen host
    #[arg(long)]
    listen_host: Option<String>,

    /// Front-end listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Backend host
    #[arg(long)]
    backend_host: Option<String>,

    /// Backend port
    #[arg(long)]
    backend_port: Option<u16>,

    /// Config file path
    #[arg(long, default_value = "~/.wsb/config.toml")]
    config: String,

    /// Close pairs idle for this many seconds (0 disables)
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Maximum concurrent pairs
    #[arg(long)]
    max_pairs: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting wsb-server");

    let config_path = PathBuf::from(&cli.config);
    let overrides = CliOverrides {
        listen_host: cli.listen_host,
        port: cli.port,
        backend_host: cli.backend_host,
        backend_port: cli.backend_port,
        idle_timeout: cli.idle_timeout,
        max_pairs: cli.max_pairs,
    };
    let config = match BridgeConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let engine = Arc::new(BridgeEngine::new(config));

    // Bind failure is fatal: nothing useful can run without the listener.
    let (addr, incoming) = match engine.listen().await {
        Ok(bound) => bound,
        Err(e) => {
            error!(error = %e, "failed to start listener");
            std::process::exit(1);
        }
    };
    info!(
        listen = %addr,
        backend = %engine.config().backend_addr(),
        "wsb-server listening"
    );

    // Run until shutdown signal
    tokio::select! {
        _ = engine.clone().serve(incoming) => {}
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    let remaining = engine.shutdown().await;
    info!(remaining, "wsb-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
