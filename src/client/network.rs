//! Network configuration for proxy, custom CA and connection pool settings.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Connection pool configuration.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub idle_timeout: Duration,
    pub max_idle_per_host: usize,
    pub tcp_keepalive: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(90),
            max_idle_per_host: 16,
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

/// Proxy server configuration.
#[derive(Clone, Debug, Default)]
pub struct ProxyConfig {
    pub https: Option<String>,
    pub http: Option<String>,
}

impl ProxyConfig {
    /// Read `HTTPS_PROXY` / `HTTP_PROXY` (either case).
    pub fn from_env() -> Option<Self> {
        let read = |upper: &str, lower: &str| env::var(upper).or_else(|_| env::var(lower)).ok();
        let https = read("HTTPS_PROXY", "https_proxy");
        let http = read("HTTP_PROXY", "http_proxy");

        if https.is_none() && http.is_none() {
            return None;
        }
        Some(Self { https, http })
    }

    pub fn https(url: impl Into<String>) -> Self {
        Self {
            https: Some(url.into()),
            http: None,
        }
    }

    pub fn http(mut self, url: impl Into<String>) -> Self {
        self.http = Some(url.into());
        self
    }

    fn apply(&self, mut builder: reqwest::ClientBuilder) -> crate::Result<reqwest::ClientBuilder> {
        if let Some(ref url) = self.https {
            builder = builder.proxy(reqwest::Proxy::https(url)?);
        }
        if let Some(ref url) = self.http {
            builder = builder.proxy(reqwest::Proxy::http(url)?);
        }
        Ok(builder)
    }
}

/// Network configuration for the backend HTTP client.
#[derive(Clone, Debug, Default)]
pub struct NetworkConfig {
    pub proxy: Option<ProxyConfig>,
    /// Extra root certificate (PEM), e.g. for a corporate MITM proxy.
    pub ca_cert: Option<PathBuf>,
    pub pool: Option<PoolConfig>,
}

impl NetworkConfig {
    pub fn from_env() -> Self {
        Self {
            proxy: ProxyConfig::from_env(),
            ca_cert: env::var("SSL_CERT_FILE").ok().map(PathBuf::from),
            pool: None,
        }
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.proxy.is_some() || self.ca_cert.is_some() || self.pool.is_some()
    }

    /// Apply configuration to a reqwest `ClientBuilder`.
    pub fn apply_to_builder(
        &self,
        mut builder: reqwest::ClientBuilder,
    ) -> crate::Result<reqwest::ClientBuilder> {
        if let Some(ref proxy) = self.proxy {
            builder = proxy.apply(builder)?;
        }

        if let Some(ref ca_path) = self.ca_cert {
            let pem = std::fs::read(ca_path).map_err(|e| {
                crate::Error::Config(format!("cannot read CA certificate {}: {e}", ca_path.display()))
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        if let Some(ref pool) = self.pool {
            builder = builder
                .pool_idle_timeout(pool.idle_timeout)
                .pool_max_idle_per_host(pool.max_idle_per_host);
            if let Some(keepalive) = pool.tcp_keepalive {
                builder = builder.tcp_keepalive(keepalive);
            }
        }

        Ok(builder)
    }
}
