//! Courier Send
//!
//! Uploads one file to a courier server once per encoding. All requests are
//! started back-to-back without waiting for earlier ones to finish.
//!
//! # Usage
//!
//! ```bash
//! # Send ./gh-woman_200x250.jpeg to localhost:5566 with all three encodings
//! courier-send
//!
//! # Send another file, base64 only
//! courier-send photo.jpeg --strategy base64
//!
//! # With verbose logging
//! RUST_LOG=debug courier-send
//! ```
//!
//! # Environment Variables
//!
//! - `COURIER_HOST`: Server host (default: localhost)
//! - `COURIER_PORT`: Server port (default: 5566)
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use courier_core::{load_config, Strategy, TransferClient};

/// Upload a file to a courier server
#[derive(Debug, Parser)]
#[command(name = "courier-send", version, about)]
struct Args {
    /// File to upload
    #[arg(default_value = "./gh-woman_200x250.jpeg")]
    source: PathBuf,

    /// Server host
    #[arg(long, env = "COURIER_HOST")]
    host: Option<String>,

    /// Server port
    #[arg(long, env = "COURIER_PORT")]
    port: Option<u16>,

    /// Encoding to use (binary, base64, buffer); repeatable, default all
    #[arg(long = "strategy", short = 's', value_parser = parse_strategy)]
    strategies: Vec<Strategy>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    /// Strategies to send; all three when none were given
    fn selected_strategies(&self) -> Vec<Strategy> {
        if self.strategies.is_empty() {
            Strategy::ALL.to_vec()
        } else {
            self.strategies.clone()
        }
    }
}

fn parse_strategy(name: &str) -> Result<Strategy, String> {
    Strategy::from_name(name).ok_or_else(|| {
        format!("unknown strategy {name:?} (expected binary, base64 or buffer)")
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("courier_send=info".parse()?)
                .add_directive("courier_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let strategies = args.selected_strategies();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let client = TransferClient::from_config(&config);
    let source = Arc::new(args.source);

    info!(source = ?source, server = %client.base_url(), "Starting uploads");

    let uploads: Vec<_> = strategies
        .into_iter()
        .map(|strategy| {
            let client = client.clone();
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                match client.send(strategy, &source).await {
                    Ok(receipt) => {
                        info!(
                            strategy = %strategy,
                            status = receipt.status.as_u16(),
                            body_len = receipt.body_len,
                            "Upload finished"
                        );
                        true
                    }
                    Err(e) => {
                        error!(strategy = %strategy, error = %e, "Upload failed");
                        false
                    }
                }
            })
        })
        .collect();

    let mut failed = 0;
    for result in futures::future::join_all(uploads).await {
        match result {
            Ok(true) => {}
            Ok(false) => failed += 1,
            Err(e) => {
                error!(error = %e, "Upload task panicked");
                failed += 1;
            }
        }
    }

    info!(failed, "All uploads done");
    Ok(())
}
