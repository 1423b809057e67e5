//! Encoding Strategies
//!
//! The three wire encodings a payload can travel in. Each variant bundles a
//! request path, a content type, an upload label and an encode/decode pair.
//!
//! # Wire Formats
//!
//! ```text
//! +-----------+------------+---------------------------+-----------------------+
//! | Strategy  | Path       | Content-Type              | Body                  |
//! +-----------+------------+---------------------------+-----------------------+
//! | Raw       | /binary    | application/octet-stream  | payload bytes         |
//! | Base64    | /base64    | text/plain                | standard, padded      |
//! | JsonArray | /buffer    | application/json          | [1,2,255]             |
//! +-----------+------------+---------------------------+-----------------------+
//! ```
//!
//! For every strategy `decode(encode(payload)) == payload`, including the
//! empty payload.

use std::fmt;

use base64::{engine::general_purpose, Engine};
use serde_json::Value;
use thiserror::Error;

/// Errors produced while encoding or decoding a request body
#[derive(Debug, Error)]
pub enum CodecError {
    /// Body is not valid standard base64
    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Body is not valid JSON, or the payload could not be serialized
    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON body has the wrong shape
    #[error("expected a JSON array of bytes, found {found}")]
    NotAnArray {
        /// JSON type that was found instead
        found: &'static str,
    },

    /// An array element is not an integer in 0..=255
    #[error("element {index} is not a byte value: {value}")]
    NotAByte {
        /// Position of the offending element
        index: usize,
        /// The element as it appeared in the body
        value: String,
    },
}

/// A wire encoding for the payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Bytes sent as-is
    Raw,
    /// Standard base64 text
    Base64,
    /// JSON array of byte values
    JsonArray,
}

impl Strategy {
    /// All strategies, in the order the driver sends them
    pub const ALL: [Strategy; 3] = [Self::Raw, Self::Base64, Self::JsonArray];

    /// Request path this strategy is posted to
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Raw => "/binary",
            Self::Base64 => "/base64",
            Self::JsonArray => "/buffer",
        }
    }

    /// Value of the `content-type` header
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Raw => "application/octet-stream",
            Self::Base64 => "text/plain",
            Self::JsonArray => "application/json",
        }
    }

    /// Label used in output file names
    #[must_use]
    pub fn upload_label(self) -> &'static str {
        match self {
            Self::Raw => "octet",
            Self::Base64 => "base64",
            Self::JsonArray => "buffer",
        }
    }

    /// Short name, as accepted on the command line
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Raw => "binary",
            Self::Base64 => "base64",
            Self::JsonArray => "buffer",
        }
    }

    /// Look up the strategy served at `path`
    ///
    /// Matching is exact; any query string must already be stripped.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.path() == path)
    }

    /// Look up a strategy by its short name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Serialize a payload into a request body
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Json` if JSON serialization fails.
    pub fn encode(self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Raw => Ok(payload.to_vec()),
            Self::Base64 => Ok(general_purpose::STANDARD.encode(payload).into_bytes()),
            Self::JsonArray => Ok(serde_json::to_vec(payload)?),
        }
    }

    /// Reconstruct a payload from a request body
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` when the body is not a valid instance of this
    /// strategy's format. `Raw` never fails.
    pub fn decode(self, body: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Raw => Ok(body.to_vec()),
            Self::Base64 => Ok(general_purpose::STANDARD.decode(body.trim_ascii())?),
            Self::JsonArray => decode_byte_array(body),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decode a JSON byte array
///
/// Accepts a bare array (`[1,2,255]`) or the Node.js buffer envelope
/// (`{"type":"Buffer","data":[1,2,255]}`).
fn decode_byte_array(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let value: Value = serde_json::from_slice(body)?;

    let elements = match value {
        Value::Array(elements) => elements,
        Value::Object(mut map) if map.get("type").and_then(Value::as_str) == Some("Buffer") => {
            match map.remove("data") {
                Some(Value::Array(elements)) => elements,
                Some(other) => {
                    return Err(CodecError::NotAnArray {
                        found: json_type(&other),
                    })
                }
                None => return Err(CodecError::NotAnArray { found: "object" }),
            }
        }
        other => {
            return Err(CodecError::NotAnArray {
                found: json_type(&other),
            })
        }
    };

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            element
                .as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| CodecError::NotAByte {
                    index,
                    value: element.to_string(),
                })
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
