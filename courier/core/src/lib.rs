//! Courier Core - Binary Payload Transfer over HTTP
//!
//! Moves a binary payload (an image) from a client to a server using one of
//! three wire encodings, and reconstructs the exact bytes on arrival.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                          ┌──────────────────┐
//! │  TransferClient  │   POST /binary  (raw)    │   UploadServer   │
//! │                  │   POST /base64  (text)   │                  │
//! │ file ─► encode ──┼─────────────────────────►│── decode ─► file │
//! │                  │   POST /buffer  (json)   │                  │
//! └──────────────────┘                          └──────────────────┘
//!            │                                            │
//!            └────────────── Strategy ────────────────────┘
//!               (path, content type, encode/decode)
//! ```
//!
//! # Key Types
//!
//! - [`Strategy`]: The three encodings and their wire details
//! - [`TransferClient`]: Sends a file with a chosen strategy
//! - [`UploadServer`]: Receives uploads and writes them to disk
//! - [`CourierConfig`]: Host, port, output directory and limits
//!
//! # Quick Start
//!
//! ```ignore
//! use courier_core::{CourierConfig, Strategy, TransferClient, UploadServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CourierConfig::from_env();
//!
//!     let server = UploadServer::bind(&config).await?;
//!     tokio::spawn(server.run_until(std::future::pending()));
//!
//!     let client = TransferClient::from_config(&config);
//!     let receipt = client
//!         .send(Strategy::Base64, "gh-woman_200x250.jpeg".as_ref())
//!         .await?;
//!     println!("{}", receipt.status);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod server;
pub mod strategy;

// Re-exports for convenience
pub use client::{PreparedUpload, TransferClient, TransferError, UploadReceipt};
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, CourierConfig,
};
pub use server::{UploadContext, UploadError, UploadOutcome, UploadServer};
pub use strategy::{CodecError, Strategy};
