//! Courier Configuration
//!
//! Settings shared by the client driver and the upload server.
//!
//! # Sources
//!
//! Later sources override earlier ones:
//!
//! 1. Built-in defaults (`localhost:5566`, platform temp dir, 64 MiB limit)
//! 2. TOML file (`~/.config/courier/courier.toml` or an explicit path)
//! 3. Environment variables
//! 4. Command-line flags (applied by the binaries)
//!
//! # Environment Variables
//!
//! - `COURIER_HOST`: Host the server binds to / the client connects to
//! - `COURIER_PORT`: TCP port
//! - `COURIER_OUTPUT_DIR`: Directory uploads are written to
//! - `COURIER_MAX_BODY_BYTES`: Largest request body the server accepts
//!
//! # Example File
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 5566
//! output_dir = "/var/tmp/courier"
//! max_body_bytes = 8388608
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default host
pub const DEFAULT_HOST: &str = "localhost";

/// Default TCP port
pub const DEFAULT_PORT: u16 = 5566;

/// Default request body limit (64 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path:?}: {source}")]
    Read {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for `CourierConfig`
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        /// Path of the file
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: toml::de::Error,
    },
}

/// Courier configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Host name or address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Directory the server writes reconstructed payloads to
    pub output_dir: PathBuf,

    /// Largest `content-length` the server will accept
    pub max_body_bytes: usize,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            output_dir: std::env::temp_dir(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl CourierConfig {
    /// Defaults with environment overrides applied
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `COURIER_*` environment variables on top of this configuration
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("COURIER_HOST") {
            self.host = host;
        }

        if let Some(port) = var("COURIER_PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(e) => tracing::warn!(value = %port, error = %e, "Ignoring COURIER_PORT"),
            }
        }

        if let Some(dir) = var("COURIER_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }

        if let Some(limit) = var("COURIER_MAX_BODY_BYTES") {
            match limit.parse() {
                Ok(limit) => self.max_body_bytes = limit,
                Err(e) => {
                    tracing::warn!(value = %limit, error = %e, "Ignoring COURIER_MAX_BODY_BYTES");
                }
            }
        }
    }

    /// `host:port` as used for binding and connecting
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Default configuration file location
///
/// `$XDG_CONFIG_HOME/courier/courier.toml` on Linux, the platform
/// equivalent elsewhere.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("courier").join("courier.toml"))
}

/// Load configuration from a TOML file
///
/// Keys missing from the file keep their defaults.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: CourierConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = ?path, "Loaded config file");
    Ok(config)
}

/// Load configuration with environment overrides applied
///
/// Reads `path` if given, otherwise the default file when it exists, and
/// falls back to built-in defaults.
///
/// # Errors
///
/// Returns `ConfigError` if the chosen file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<CourierConfig, ConfigError> {
    let mut config = match (path, default_config_path()) {
        (Some(path), _) => load_config_from_path(path)?,
        (None, Some(default)) if default.exists() => load_config_from_path(&default)?,
        _ => CourierConfig::default(),
    };
    config.apply_env();
    Ok(config)
}
