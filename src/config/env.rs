//! Environment variable configuration source.

use super::source::ConfigSource;
use super::{ConfigError, ConfigResult};

/// Default prefix for environment variables.
pub const DEFAULT_ENV_PREFIX: &str = "AUTHFETCH_";

/// Reads `identity.fast_ttl_ms` from `AUTHFETCH_IDENTITY_FAST_TTL_MS`.
#[derive(Debug, Clone)]
pub struct EnvConfigSource {
    prefix: String,
}

impl EnvConfigSource {
    pub fn new() -> Self {
        Self::prefixed(DEFAULT_ENV_PREFIX)
    }

    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace('.', "_"))
    }
}

impl Default for EnvConfigSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConfigSource for EnvConfigSource {
    fn name(&self) -> &str {
        "env"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        match std::env::var(self.env_key(key)) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }
}
