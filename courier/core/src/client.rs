//! Upload Client
//!
//! Reads a payload from disk, encodes it with a [`Strategy`] and POSTs it to
//! the strategy's path. The response body is streamed and logged chunk by
//! chunk.
//!
//! Each call is one-shot: connection failures are returned to the caller
//! and never retried.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CourierConfig;
use crate::strategy::{CodecError, Strategy};

/// Errors sending one upload
#[derive(Debug, Error)]
pub enum TransferError {
    /// Source file missing or unreadable
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// Source file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Payload could not be encoded
    #[error("failed to encode payload: {0}")]
    Encode(#[from] CodecError),

    /// Connection refused, reset, or the response stream broke
    #[error("connection to {url} failed: {source}")]
    Connection {
        /// Target URL
        url: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },
}

/// An encoded request, ready to send
#[derive(Clone, Debug)]
pub struct PreparedUpload {
    /// Strategy the body was encoded with
    pub strategy: Strategy,
    /// Encoded body
    pub body: Vec<u8>,
}

impl PreparedUpload {
    /// Encode `payload` with `strategy`
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Encode` if encoding fails.
    pub fn encode(strategy: Strategy, payload: &[u8]) -> Result<Self, TransferError> {
        Ok(Self {
            strategy,
            body: strategy.encode(payload)?,
        })
    }

    /// Request path
    #[must_use]
    pub fn path(&self) -> &'static str {
        self.strategy.path()
    }

    /// Value of the `content-type` header
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.strategy.content_type()
    }

    /// Value of the `content-length` header: the byte length of the body
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.body.len()
    }
}

/// What came back from one upload
#[derive(Clone, Debug)]
pub struct UploadReceipt {
    /// Strategy used
    pub strategy: Strategy,
    /// Response status
    pub status: StatusCode,
    /// Bytes sent in the request body
    pub body_len: usize,
    /// Bytes received in the response body
    pub response_len: usize,
}

/// HTTP client for one upload server
#[derive(Clone, Debug)]
pub struct TransferClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl TransferClient {
    /// Create a client for `host:port`
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{port}", host.as_ref()),
            http_client: reqwest::Client::new(),
        }
    }

    /// Create a client from configuration
    #[must_use]
    pub fn from_config(config: &CourierConfig) -> Self {
        Self::new(&config.host, config.port)
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Read `source` and encode it with `strategy`
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Io` if the file cannot be read, or
    /// `TransferError::Encode` if encoding fails.
    pub async fn prepare(
        &self,
        strategy: Strategy,
        source: &Path,
    ) -> Result<PreparedUpload, TransferError> {
        let payload = tokio::fs::read(source)
            .await
            .map_err(|e| TransferError::Io {
                path: source.to_path_buf(),
                source: e,
            })?;

        debug!(strategy = %strategy, path = ?source, bytes = payload.len(), "Payload read");
        PreparedUpload::encode(strategy, &payload)
    }

    /// Read, encode and upload `source`
    ///
    /// A non-success status is logged but not an error.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Io` or `TransferError::Encode` before anything
    /// is sent, and `TransferError::Connection` if the request or the
    /// response stream fails.
    pub async fn send(
        &self,
        strategy: Strategy,
        source: &Path,
    ) -> Result<UploadReceipt, TransferError> {
        let upload = self.prepare(strategy, source).await?;
        self.send_prepared(upload).await
    }

    /// Upload an already encoded body
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Connection` if the request or the response
    /// stream fails.
    pub async fn send_prepared(
        &self,
        upload: PreparedUpload,
    ) -> Result<UploadReceipt, TransferError> {
        let url = format!("{}{}", self.base_url, upload.path());
        let body_len = upload.content_length();
        let connection_error = |source| TransferError::Connection {
            url: url.clone(),
            source,
        };

        info!(strategy = %upload.strategy, url = %url, body_len, "Sending upload");

        let response = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, upload.content_type())
            .header(CONTENT_LENGTH, body_len)
            .body(upload.body)
            .send()
            .await
            .map_err(connection_error)?;

        let status = response.status();
        let mut stream = response.bytes_stream();
        let mut response_len = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(connection_error)?;
            response_len += chunk.len();
            info!(strategy = %upload.strategy, chunk = ?chunk, "Response chunk");
        }

        info!(
            strategy = %upload.strategy,
            status = status.as_u16(),
            "entire response received"
        );

        if !status.is_success() {
            warn!(strategy = %upload.strategy, status = %status, "Server rejected upload");
        }

        Ok(UploadReceipt {
            strategy: upload.strategy,
            status,
            body_len,
            response_len,
        })
    }
}
