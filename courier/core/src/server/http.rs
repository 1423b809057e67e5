//! HTTP/1.1 Request Framing
//!
//! Just enough HTTP for one upload per connection: a request head, a body
//! of exactly `content-length` bytes, and an empty response.
//!
//! # Request Format
//!
//! ```text
//! POST /base64 HTTP/1.1\r\n
//! content-type: text/plain\r\n
//! content-length: 4\r\n
//! \r\n
//! AQL/
//! ```
//!
//! Chunked bodies are not supported; a request without `content-length` is
//! rejected with 411.

use reqwest::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::UploadError;

/// Maximum size of the request line plus headers (16 KB)
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Read chunk size
const READ_CHUNK: usize = 4096;

/// End of the request head
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Declared body length
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentLength {
    /// Parsed value
    pub value: usize,
    /// Header value as sent, used to label output files
    pub raw: String,
}

/// Parsed request line and headers
#[derive(Clone, Debug)]
pub struct RequestHead {
    /// Request method, case preserved
    pub method: String,
    /// Request target including any query string
    pub target: String,
    /// `HTTP/1.0` or `HTTP/1.1`
    pub version: String,
    /// Headers with lowercased names, in arrival order
    headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parse a head (without the terminating blank line)
    ///
    /// # Errors
    ///
    /// Returns `UploadError::MalformedRequest` for anything that is not an
    /// HTTP/1.x request line followed by `name: value` header lines.
    pub fn parse(bytes: &[u8]) -> Result<Self, UploadError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| UploadError::MalformedRequest("request head is not UTF-8".into()))?;

        let mut lines = text.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(UploadError::MalformedRequest(format!(
                "bad request line: {request_line:?}"
            )));
        };

        if version != "HTTP/1.1" && version != "HTTP/1.0" {
            return Err(UploadError::MalformedRequest(format!(
                "unsupported version: {version}"
            )));
        }

        if !target.starts_with('/') {
            return Err(UploadError::MalformedRequest(format!(
                "unsupported request target: {target}"
            )));
        }

        let mut headers = Vec::new();
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                return Err(UploadError::MalformedRequest(format!(
                    "bad header line: {line:?}"
                )));
            };
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(UploadError::MalformedRequest(format!(
                    "bad header name: {name:?}"
                )));
            }
            headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
        }

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers,
        })
    }

    /// Request path without the query string
    #[must_use]
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    /// First value of a header (name is matched case-insensitively)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared body length
    ///
    /// Returns `Ok(None)` when there is no `content-length`, or when a
    /// `transfer-encoding` is present (chunked bodies are not read).
    ///
    /// # Errors
    ///
    /// Returns `UploadError::InvalidContentLength` if a value is not a
    /// decimal number or repeated headers disagree.
    pub fn content_length(&self) -> Result<Option<ContentLength>, UploadError> {
        if self.header("transfer-encoding").is_some() {
            return Ok(None);
        }

        let mut declared: Option<ContentLength> = None;
        for (_, raw) in self.headers.iter().filter(|(n, _)| n == "content-length") {
            if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(UploadError::InvalidContentLength(raw.clone()));
            }
            let value: usize = raw
                .parse()
                .map_err(|_| UploadError::InvalidContentLength(raw.clone()))?;

            match &declared {
                Some(previous) if previous.value != value => {
                    return Err(UploadError::InvalidContentLength(format!(
                        "conflicting values {} and {raw}",
                        previous.raw
                    )));
                }
                Some(_) => {}
                None => {
                    declared = Some(ContentLength {
                        value,
                        raw: raw.clone(),
                    });
                }
            }
        }

        Ok(declared)
    }

    /// Whether the client waits for `100 Continue` before sending the body
    #[must_use]
    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    }
}

/// Buffered reader for one request on a connection
///
/// Bytes read past the end of the head are kept and count toward the body.
pub struct RequestReader<S> {
    stream: S,
    buffer: Vec<u8>,
}

impl<S: AsyncRead + Unpin> RequestReader<S> {
    /// Wrap a connection
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Mutable access to the underlying connection
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Read until the end of the request head and parse it
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the peer sent nothing
    /// - `MalformedRequest` if the peer closed mid-head or the head is invalid
    /// - `HeadTooLarge` if no terminator arrives within `MAX_HEAD_BYTES`
    pub async fn read_head(&mut self) -> Result<RequestHead, UploadError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut searched = 0;

        loop {
            if let Some(pos) = find(&self.buffer[searched..], HEAD_TERMINATOR) {
                let end = searched + pos;
                let head = RequestHead::parse(&self.buffer[..end]);
                self.buffer.drain(..end + HEAD_TERMINATOR.len());
                return head;
            }

            if self.buffer.len() > MAX_HEAD_BYTES {
                return Err(UploadError::HeadTooLarge {
                    max: MAX_HEAD_BYTES,
                });
            }

            // The terminator may straddle two reads
            searched = self.buffer.len().saturating_sub(HEAD_TERMINATOR.len() - 1);

            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(if self.buffer.is_empty() {
                    UploadError::ConnectionClosed
                } else {
                    UploadError::MalformedRequest("connection closed inside request head".into())
                });
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read exactly `len` body bytes
    ///
    /// # Errors
    ///
    /// Returns `UploadError::LengthMismatch` if the peer closes early.
    pub async fn read_body(&mut self, len: usize) -> Result<Vec<u8>, UploadError> {
        let buffered = self.buffer.len().min(len);
        let mut body = Vec::with_capacity(len);
        body.extend(self.buffer.drain(..buffered));

        let mut chunk = [0u8; READ_CHUNK];
        while body.len() < len {
            let want = (len - body.len()).min(READ_CHUNK);
            let n = self.stream.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(UploadError::LengthMismatch {
                    declared: len,
                    received: body.len(),
                });
            }
            body.extend_from_slice(&chunk[..n]);
        }

        if !self.buffer.is_empty() {
            tracing::debug!(
                extra = self.buffer.len(),
                "Ignoring bytes after declared body"
            );
        }

        Ok(body)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Send an interim `100 Continue`
pub async fn write_continue<W: AsyncWrite + Unpin>(writer: &mut W) -> std::io::Result<()> {
    writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
    writer.flush().await
}

/// Send a final response with an empty body and close semantics
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: StatusCode,
) -> std::io::Result<()> {
    writer.write_all(&response_bytes(status)).await?;
    writer.flush().await
}

/// Serialized response head for `status`
#[must_use]
pub fn response_bytes(status: StatusCode) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("");
    let mut head = format!("HTTP/1.1 {} {reason}\r\n", status.as_u16());
    if status == StatusCode::METHOD_NOT_ALLOWED {
        head.push_str("allow: POST\r\n");
    }
    head.push_str("content-length: 0\r\nconnection: close\r\n\r\n");
    head.into_bytes()
}
