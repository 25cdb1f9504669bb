//! # authfetch
//!
//! Authenticated HTTP client core for a backend API that sits behind a
//! Supabase/GoTrue identity provider.
//!
//! The client injects a bearer token into every request and takes care of
//! the concurrency problems that come with it:
//!
//! - **Token cache**: bearer tokens are cached per user and refreshed through
//!   a single coalesced refresh, so a burst of requests after expiry causes
//!   one refresh instead of a storm.
//! - **Identity cache**: the current user is trusted from a fast local read
//!   for a few seconds and re-validated against the provider's server on a
//!   fixed interval.
//! - **Request deduplication**: concurrent identical reads share one network
//!   call; every caller gets its own copy of the response.
//! - **Retry after refresh**: a 401 forces one token refresh and one retry.
//!   Provider throttling falls back to the last cached token.
//! - **Stats**: request counts, cache hits, refreshes, errors and a rolling
//!   latency window.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use authfetch::{AuthClient, ClientConfig, GoTrueProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), authfetch::Error> {
//!     let provider = GoTrueProvider::new("https://project.supabase.co", "anon-key")?;
//!     provider.sign_in_with_password("ana@example.com", "secret").await?;
//!
//!     let client = AuthClient::builder()
//!         .config(ClientConfig::default().base_url("https://app.example.com"))
//!         .provider(provider)
//!         .build()?;
//!
//!     let response = client.get("/profile").await?;
//!     let profile: serde_json::Value = response.json()?;
//!     println!("{profile}");
//!     println!("{:?}", client.stats());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod auth;
pub mod client;
pub mod config;
pub mod observability;
pub mod prelude;

use std::sync::Arc;
use std::time::Duration;

pub use auth::{
    GoTrueProvider, Identity, IdentityCache, IdentityProvider, ReadinessGate, Session,
    StaticProvider, TokenCache, UserId,
};
pub use client::{
    ApiResponse, AuthClient, AuthClientBuilder, Body, ClientConfig, MultipartBody, NetworkConfig,
    PoolConfig, ProxyConfig, RequestOptions, RequestPool, ReqwestTransport, Transport,
};
pub use config::{
    ConfigError, ConfigSource, EnvConfigSource, FileConfigSource, LayeredConfig,
    MemoryConfigSource,
};
pub use observability::{FetchStats, RequestSpan, StatsCollector};

/// Error type for authenticated requests.
///
/// The enum is `Clone` because coalesced operations (shared token refreshes,
/// deduplicated reads) hand the same outcome to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No identity could be resolved for the current caller.
    #[error("Not authenticated: no active user session")]
    NotAuthenticated,

    /// The provider could not produce a valid access token.
    #[error("Token refresh failed: {message}")]
    TokenRefresh { message: String },

    /// The identity provider throttled the caller.
    #[error("Identity provider quota exceeded: {message}")]
    ProviderQuotaExceeded { message: String },

    /// Backend still answered 401 after a forced token refresh.
    #[error("Unauthorized after token refresh: {body}")]
    Unauthorized { body: String },

    /// Backend returned a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A single attempt exceeded its timeout.
    #[error("Request timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// The identity provider could not be reached or answered unexpectedly.
    #[error("Identity provider error: {message}")]
    Provider { message: String },

    /// Network connectivity or request failed.
    #[error("Network request failed: {0}")]
    Network(#[source] Arc<reqwest::Error>),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request parameters are invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A background task failed unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidRequest(format!("invalid URL: {err}"))
    }
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing identity, failed refresh, or a terminal 401/403.
    Authorization,
    /// Configuration or request construction errors.
    Configuration,
    /// Network, throttling, timeouts or 5xx responses that may succeed later.
    Transient,
    /// Other backend responses.
    Backend,
    /// Cancellation or unexpected internal failures.
    Internal,
}

impl Error {
    pub fn token_refresh(message: impl Into<String>) -> Self {
        Error::TokenRefresh {
            message: message.into(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Error::Provider {
            message: message.into(),
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Error::ProviderQuotaExceeded {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotAuthenticated | Error::TokenRefresh { .. } | Error::Unauthorized { .. } => {
                ErrorCategory::Authorization
            }
            Error::Http {
                status: 401 | 403, ..
            } => ErrorCategory::Authorization,

            Error::Config(_) | Error::InvalidRequest(_) => ErrorCategory::Configuration,

            Error::ProviderQuotaExceeded { .. }
            | Error::Provider { .. }
            | Error::Network(_)
            | Error::Timeout(_) => ErrorCategory::Transient,
            Error::Http {
                status: 429 | 500..=599,
                ..
            } => ErrorCategory::Transient,

            Error::Http { .. } | Error::Json(_) => ErrorCategory::Backend,

            Error::Cancelled | Error::Internal(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_authorization_error(&self) -> bool {
        self.category() == ErrorCategory::Authorization
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized { .. } | Error::Http { status: 401, .. }
        )
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Error::ProviderQuotaExceeded { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Unauthorized { .. } => Some(401),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for authfetch operations.
pub type Result<T> = std::result::Result<T, Error>;
