//! Upload Persistence
//!
//! Output files are named by strategy and declared length:
//! `{output_dir}/gh-woman-{octet|base64|buffer}-upload-{content-length}.jpeg`.
//! The same pair always maps to the same file; a later upload overwrites it.

use std::path::{Path, PathBuf};

use super::error::UploadError;
use crate::strategy::Strategy;

/// File name stem for stored uploads
pub const UPLOAD_STEM: &str = "gh-woman";

/// File extension for stored uploads
pub const UPLOAD_EXTENSION: &str = "jpeg";

/// File name for an upload of `strategy` with the given `content-length` label
#[must_use]
pub fn upload_file_name(strategy: Strategy, content_length: &str) -> String {
    format!(
        "{UPLOAD_STEM}-{}-upload-{content_length}.{UPLOAD_EXTENSION}",
        strategy.upload_label()
    )
}

/// Full destination path inside `output_dir`
#[must_use]
pub fn upload_path(output_dir: &Path, strategy: Strategy, content_length: &str) -> PathBuf {
    output_dir.join(upload_file_name(strategy, content_length))
}

/// Write a reconstructed payload, replacing any existing file
///
/// # Errors
///
/// Returns `UploadError::Write` if the file cannot be written.
pub async fn persist(path: &Path, payload: &[u8]) -> Result<(), UploadError> {
    tokio::fs::write(path, payload)
        .await
        .map_err(|source| UploadError::Write {
            path: path.to_path_buf(),
            source,
        })
}
