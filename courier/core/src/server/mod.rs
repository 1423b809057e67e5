//! Upload Server
//!
//! Accepts uploads over HTTP, picks the decoder from the request path,
//! reconstructs the payload and writes it to the output directory.
//!
//! # Request Lifecycle
//!
//! ```text
//!   accept ──► read head ──► route ──► validate length ──► read body
//!                 │            │              │               │
//!                 ▼            ▼              ▼               ▼
//!               400          404/405       411/413           400
//!                                                             │
//!                          200 ◄── persist ◄── decode ◄───────┘
//!                                    │           │
//!                                    ▼           ▼
//!                                   500         400
//! ```
//!
//! Each connection carries one request and is handled on its own task.
//! Nothing is shared between connections except the output directory.

mod error;
pub mod http;
pub mod upload;

pub use error::UploadError;
pub use http::{RequestHead, RequestReader};
pub use upload::{upload_file_name, upload_path};

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::CourierConfig;
use crate::strategy::Strategy;

/// Per-server settings handed to every connection
#[derive(Clone, Debug)]
pub struct UploadContext {
    output_dir: PathBuf,
    max_body_bytes: usize,
}

impl UploadContext {
    /// Create a context writing into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>, max_body_bytes: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_body_bytes,
        }
    }

    /// Create a context from configuration
    #[must_use]
    pub fn from_config(config: &CourierConfig) -> Self {
        Self::new(config.output_dir.clone(), config.max_body_bytes)
    }

    /// Directory uploads are written to
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Largest accepted body
    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}

/// Result of handling one connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Payload decoded and written
    Stored {
        /// Strategy selected by the path
        strategy: Strategy,
        /// File the payload was written to
        path: PathBuf,
        /// Size of the reconstructed payload
        bytes: usize,
    },
    /// Request answered with an error status
    Rejected {
        /// Status sent to the client
        status: StatusCode,
    },
    /// Connection ended without a response
    Abandoned,
}

/// HTTP upload server bound to a TCP port
pub struct UploadServer {
    listener: TcpListener,
    context: Arc<UploadContext>,
}

impl UploadServer {
    /// Bind to `config.host:config.port`
    ///
    /// Creates the output directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created or the
    /// address cannot be bound.
    pub async fn bind(config: &CourierConfig) -> std::io::Result<Self> {
        let context = UploadContext::from_config(config);

        tokio::fs::create_dir_all(context.output_dir())
            .await
            .map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("Failed to create output directory {:?}: {e}", context.output_dir()),
                )
            })?;

        let listener = TcpListener::bind(config.address()).await?;

        Ok(Self {
            listener,
            context: Arc::new(context),
        })
    }

    /// Address actually bound (useful with port 0)
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the socket address cannot be queried.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Settings shared with connection handlers
    #[must_use]
    pub fn context(&self) -> &UploadContext {
        &self.context
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Stops accepting once `shutdown` resolves, then waits for every
    /// connection already accepted to finish before returning.
    ///
    /// # Errors
    ///
    /// Currently infallible; accept errors are logged and the loop continues.
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = self.local_addr() {
            info!(
                addr = %addr,
                output_dir = ?self.context.output_dir(),
                "Server is running on http://{}",
                addr
            );
        }

        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping accept loop");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "Accept failed");
                            continue;
                        }
                    };

                    let context = Arc::clone(&self.context);
                    let span = tracing::info_span!(
                        "connection",
                        conn_id = %Uuid::new_v4(),
                        peer = %peer
                    );
                    connections.spawn(
                        async move {
                            let outcome = handle_connection(stream, &context).await;
                            debug!(outcome = ?outcome, "Connection finished");
                        }
                        .instrument(span),
                    );
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        if !connections.is_empty() {
            info!(in_flight = connections.len(), "Waiting for open connections");
        }
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Connection task failed");
            }
        }

        Ok(())
    }
}

/// Handle one request on `stream` and answer it
///
/// Failures are logged and turned into a status code; they never propagate.
pub async fn handle_connection<S>(stream: S, context: &UploadContext) -> UploadOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = RequestReader::new(stream);

    let (status, outcome) = match receive(&mut reader, context).await {
        Ok((strategy, path, bytes)) => {
            info!(strategy = %strategy, path = ?path, bytes, "Upload stored");
            (
                StatusCode::OK,
                UploadOutcome::Stored {
                    strategy,
                    path,
                    bytes,
                },
            )
        }
        Err(e) => match e.status() {
            Some(status) if status.is_server_error() => {
                error!(error = %e, status = status.as_u16(), "Upload failed");
                (status, UploadOutcome::Rejected { status })
            }
            Some(status) => {
                warn!(error = %e, status = status.as_u16(), "Upload rejected");
                (status, UploadOutcome::Rejected { status })
            }
            None => {
                debug!(error = %e, "Connection ended, no response sent");
                return UploadOutcome::Abandoned;
            }
        },
    };

    let stream = reader.get_mut();
    if let Err(e) = http::write_response(&mut *stream, status).await {
        debug!(error = %e, "Failed to send response");
        return UploadOutcome::Abandoned;
    }
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "Failed to close connection");
    }

    // Lingering close: drain until the peer hangs up
    let mut scratch = [0u8; 1024];
    while let Ok(n) = stream.read(&mut scratch).await {
        if n == 0 {
            break;
        }
    }

    outcome
}

/// Read, decode and persist one upload
async fn receive<S>(
    reader: &mut RequestReader<S>,
    context: &UploadContext,
) -> Result<(Strategy, PathBuf, usize), UploadError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = reader.read_head().await?;
    info!(
        method = %head.method,
        target = %head.target,
        version = %head.version,
        "Request received"
    );

    let strategy = Strategy::from_path(head.path()).ok_or_else(|| UploadError::RouteNotFound {
        path: head.path().to_string(),
    })?;

    if head.method != "POST" {
        return Err(UploadError::MethodNotAllowed {
            method: head.method.clone(),
            path: head.path().to_string(),
        });
    }

    let declared = head.content_length()?.ok_or(UploadError::LengthRequired)?;
    if declared.value > context.max_body_bytes {
        return Err(UploadError::PayloadTooLarge {
            declared: declared.value,
            max: context.max_body_bytes,
        });
    }

    if head.expects_continue() {
        http::write_continue(reader.get_mut()).await?;
    }

    let body = reader.read_body(declared.value).await?;
    debug!(strategy = %strategy, body_len = body.len(), "Body received");

    let payload = strategy
        .decode(&body)
        .map_err(|source| UploadError::Decode { strategy, source })?;

    let path = upload_path(&context.output_dir, strategy, &declared.raw);
    upload::persist(&path, &payload).await?;

    Ok((strategy, path, payload.len()))
}
