//! Read-only configuration sources.
//!
//! ```rust,no_run
//! use authfetch::ClientConfig;
//! use authfetch::config::{EnvConfigSource, FileConfigSource, LayeredConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sources = LayeredConfig::new()
//!     .source(EnvConfigSource::prefixed("AUTHFETCH_"))
//!     .source(FileConfigSource::new("authfetch.json"));
//! let config = ClientConfig::load(&sources).await?;
//! # Ok(())
//! # }
//! ```

mod env;
mod file;
mod layered;
mod memory;
mod source;

pub use env::{DEFAULT_ENV_PREFIX, EnvConfigSource};
pub use file::FileConfigSource;
pub use layered::LayeredConfig;
pub use memory::MemoryConfigSource;
pub use source::{ConfigSource, ConfigSourceExt};

use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration file is not valid JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err.to_string())
    }
}
