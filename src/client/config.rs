//! Client configuration.

use std::time::Duration;

use crate::auth::{DEFAULT_FAST_TTL, DEFAULT_REVALIDATE_INTERVAL, DEFAULT_TOKEN_TTL};
use crate::config::{ConfigSource, ConfigSourceExt};
use crate::observability::DEFAULT_WINDOW;
use crate::{Error, Result};

use super::network::NetworkConfig;

/// Default backend origin.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
/// Routing prefix prepended to relative API paths.
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";
pub const DEFAULT_TIMEZONE_HEADER: &str = "X-User-Timezone";

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Origin the API prefix and relative paths are joined onto.
    pub base_url: String,
    /// Routing prefix for relative API paths.
    pub api_prefix: String,
    /// Per-attempt timeout when the caller supplies no cancellation token.
    pub request_timeout: Duration,
    /// Bearer tokens younger than this are reused without a refresh.
    pub token_ttl: Duration,
    /// Identity served with no provider call at all.
    pub identity_fast_ttl: Duration,
    /// Maximum time between server-validated identity checks.
    pub identity_revalidate_interval: Duration,
    /// Number of latency samples kept for the average.
    pub stats_window: usize,
    /// IANA timezone sent with every request.
    pub timezone: String,
    pub timezone_header: String,
    pub network: Option<NetworkConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            token_ttl: DEFAULT_TOKEN_TTL,
            identity_fast_ttl: DEFAULT_FAST_TTL,
            identity_revalidate_interval: DEFAULT_REVALIDATE_INTERVAL,
            stats_window: DEFAULT_WINDOW,
            timezone: local_timezone(),
            timezone_header: DEFAULT_TIMEZONE_HEADER.to_string(),
            network: None,
        }
    }
}

fn local_timezone() -> String {
    std::env::var("TZ")
        .ok()
        .map(|tz| tz.trim_start_matches(':').to_string())
        .filter(|tz| !tz.is_empty())
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string())
}

impl ClientConfig {
    /// Build a configuration from a source, falling back to defaults for
    /// every key the source does not have.
    pub async fn load(source: &dyn ConfigSource) -> Result<Self> {
        let mut config = Self::default();

        if let Some(base_url) = source.get_raw("base_url").await? {
            config.base_url = base_url;
        }
        if let Some(prefix) = source.get_raw("api_prefix").await? {
            config.api_prefix = prefix;
        }
        if let Some(timezone) = source.get_raw("timezone").await? {
            config.timezone = timezone;
        }
        if let Some(ms) = source.get_parsed::<u64>("timeout_ms").await? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = source.get_parsed::<u64>("token_ttl_ms").await? {
            config.token_ttl = Duration::from_millis(ms);
        }
        if let Some(ms) = source.get_parsed::<u64>("identity_fast_ttl_ms").await? {
            config.identity_fast_ttl = Duration::from_millis(ms);
        }
        if let Some(ms) = source.get_parsed::<u64>("identity_revalidate_ms").await? {
            config.identity_revalidate_interval = Duration::from_millis(ms);
        }
        if let Some(window) = source.get_parsed::<usize>("stats_window").await? {
            config.stats_window = window;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn identity_intervals(mut self, fast_ttl: Duration, revalidate: Duration) -> Self {
        self.identity_fast_ttl = fast_ttl;
        self.identity_revalidate_interval = revalidate;
        self
    }

    pub fn stats_window(mut self, window: usize) -> Self {
        self.stats_window = window;
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.network = Some(network);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base_url {}: {e}", self.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "base_url must be http(s), got {}",
                base.scheme()
            )));
        }
        if !self.api_prefix.is_empty() && !self.api_prefix.starts_with('/') {
            return Err(Error::Config(format!(
                "api_prefix must start with '/', got {}",
                self.api_prefix
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request timeout must be positive".into()));
        }
        if self.stats_window == 0 {
            return Err(Error::Config("stats_window must be at least 1".into()));
        }
        Ok(())
    }
}
