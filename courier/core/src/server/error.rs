//! Upload Errors
//!
//! Everything that can go wrong while receiving one upload, and the HTTP
//! status each failure is answered with.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::strategy::{CodecError, Strategy};

/// Errors handling a single upload request
#[derive(Debug, Error)]
pub enum UploadError {
    /// Peer closed the connection before sending a request
    #[error("connection closed before a request was received")]
    ConnectionClosed,

    /// Request line or headers could not be parsed
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Request head did not end within the size limit
    #[error("request head exceeds {max} bytes")]
    HeadTooLarge {
        /// Limit in bytes
        max: usize,
    },

    /// Path does not belong to any strategy
    #[error("no route for {path}")]
    RouteNotFound {
        /// Requested path
        path: String,
    },

    /// Known path, but not a POST
    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed {
        /// Requested method
        method: String,
        /// Requested path
        path: String,
    },

    /// No `content-length`, e.g. a chunked upload
    #[error("content-length header required")]
    LengthRequired,

    /// `content-length` is not a number, or duplicates disagree
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    /// Declared body is larger than the configured limit
    #[error("body of {declared} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge {
        /// Declared `content-length`
        declared: usize,
        /// Configured limit
        max: usize,
    },

    /// Peer closed the connection before the declared body arrived
    #[error("body ended after {received} of {declared} bytes")]
    LengthMismatch {
        /// Declared `content-length`
        declared: usize,
        /// Bytes actually received
        received: usize,
    },

    /// Body is not valid for the strategy of its path
    #[error("failed to decode {strategy} body: {source}")]
    Decode {
        /// Strategy selected by the path
        strategy: Strategy,
        /// Underlying codec error
        #[source]
        source: CodecError,
    },

    /// Reconstructed payload could not be written
    #[error("failed to write {path:?}: {source}")]
    Write {
        /// Destination file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Reading from the connection failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Status to answer with, or `None` when the connection is unusable
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ConnectionClosed | Self::Io(_) => None,
            Self::MalformedRequest(_)
            | Self::HeadTooLarge { .. }
            | Self::InvalidContentLength(_)
            | Self::LengthMismatch { .. }
            | Self::Decode { .. } => Some(StatusCode::BAD_REQUEST),
            Self::RouteNotFound { .. } => Some(StatusCode::NOT_FOUND),
            Self::MethodNotAllowed { .. } => Some(StatusCode::METHOD_NOT_ALLOWED),
            Self::LengthRequired => Some(StatusCode::LENGTH_REQUIRED),
            Self::PayloadTooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            Self::Write { .. } => Some(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}
