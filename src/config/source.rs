//! Configuration source trait.

use std::str::FromStr;

use super::{ConfigError, ConfigResult};

/// A read-only key/value configuration source.
///
/// Keys are dot-separated (`identity.fast_ttl_ms`); each source maps them to
/// its own naming scheme.
#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &str;

    /// Get a raw configuration value
    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>>;
}

/// Typed access on top of [`ConfigSource::get_raw`].
pub trait ConfigSourceExt: ConfigSource {
    /// Parse a value with [`FromStr`]
    fn get_parsed<T>(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = ConfigResult<Option<T>>> + Send
    where
        T: FromStr + Send,
        T::Err: std::fmt::Display,
        Self: Sync,
    {
        async move {
            match self.get_raw(key).await? {
                Some(raw) => raw
                    .trim()
                    .parse::<T>()
                    .map(Some)
                    .map_err(|e| ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: e.to_string(),
                    }),
                None => Ok(None),
            }
        }
    }
}

impl<S: ConfigSource + ?Sized> ConfigSourceExt for S {}
