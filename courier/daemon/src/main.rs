//! Courier Daemon
//!
//! Standalone upload server. Clients POST payloads to `/binary`, `/base64`
//! or `/buffer`; each upload is decoded and written to the output directory.
//!
//! # Usage
//!
//! ```bash
//! # Listen on localhost:5566, write to the platform temp dir
//! courier-daemon
//!
//! # Custom address and output directory
//! courier-daemon --host 0.0.0.0 --port 8080 --output-dir /var/tmp/uploads
//!
//! # With verbose logging
//! RUST_LOG=debug courier-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `COURIER_HOST`: Bind host (default: localhost)
//! - `COURIER_PORT`: Bind port (default: 5566)
//! - `COURIER_OUTPUT_DIR`: Upload directory (default: platform temp dir)
//! - `COURIER_MAX_BODY_BYTES`: Largest accepted body (default: 64 MiB)
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Stop accepting connections and exit

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use courier_core::{load_config, CourierConfig, UploadServer};

/// Receive courier uploads over HTTP
#[derive(Debug, Parser)]
#[command(name = "courier-daemon", version, about)]
struct Args {
    /// Bind host
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(long)]
    port: Option<u16>,

    /// Directory uploads are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Largest accepted request body in bytes
    #[arg(long)]
    max_body_bytes: Option<usize>,

    /// Configuration file (default: ~/.config/courier/courier.toml if present)
    #[arg(long, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    /// Apply command-line flags over file and environment settings
    fn apply(self, config: &mut CourierConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(limit) = self.max_body_bytes {
            config.max_body_bytes = limit;
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("courier_daemon=info".parse()?)
                .add_directive("courier_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut config =
        load_config(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    info!("Starting Courier Daemon");
    info!("PID: {}", std::process::id());

    let server = UploadServer::bind(&config)
        .await
        .with_context(|| format!("Failed to listen on {}", config.address()))?;

    server.run_until(shutdown_signal()).await?;

    info!("Courier daemon stopped cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "courier-daemon",
            "--port",
            "8080",
            "--output-dir",
            "/var/tmp/uploads",
        ]);

        let mut config = CourierConfig::default();
        args.apply(&mut config);

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8080);
        assert_eq!(config.output_dir, PathBuf::from("/var/tmp/uploads"));
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = Args::parse_from(["courier-daemon"]);
        let mut config = CourierConfig::default();
        args.apply(&mut config);
        assert_eq!(config, CourierConfig::default());
    }
}
