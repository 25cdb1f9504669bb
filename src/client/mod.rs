//! Authenticated HTTP client.

pub mod config;
pub mod network;
mod pool;
pub mod request;
mod response;
mod transport;

pub use config::ClientConfig;
pub use network::{NetworkConfig, PoolConfig, ProxyConfig};
pub use pool::RequestPool;
pub use request::{Body, MultipartBody, Part, RequestOptions, normalize_url};
pub use response::ApiResponse;
pub use transport::{OutgoingRequest, ReqwestTransport, Transport};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::auth::{Identity, IdentityCache, IdentityProvider, ReadinessGate, TokenCache};
use crate::observability::{FetchStats, RequestSpan, StatsCollector};
use crate::{Error, Result};

struct ClientInner {
    config: ClientConfig,
    provider: Arc<dyn IdentityProvider>,
    transport: Arc<dyn Transport>,
    gate: ReadinessGate,
    identity: IdentityCache,
    tokens: TokenCache,
    pool: RequestPool,
    stats: Arc<StatsCollector>,
}

/// Authenticated client for the backend API.
///
/// Every request waits for the provider to be ready, resolves the current
/// user, attaches a bearer token and the caller's timezone, and retries once
/// with a forced refresh on 401. Concurrent identical reads share one call.
///
/// Cloning is cheap; clones share caches and stats.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<ClientInner>,
}

impl AuthClient {
    pub fn builder() -> AuthClientBuilder {
        AuthClientBuilder::default()
    }

    /// Client with default config and the `reqwest` transport.
    pub fn new(provider: impl IdentityProvider + 'static) -> Result<Self> {
        Self::builder().provider(provider).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.inner.provider
    }

    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<ApiResponse> {
        let config = &self.inner.config;
        let url = normalize_url(&config.base_url, &config.api_prefix, url);
        let span = RequestSpan::new(options.method.as_str(), &url);

        let result = self
            .dispatch(url, options, &span)
            .instrument(span.span().clone())
            .await;

        match &result {
            Ok(response) => span.record_status(response.status.as_u16()),
            Err(e) => {
                if let Some(status) = e.status() {
                    span.record_status(status);
                }
            }
        }
        span.finish();
        result
    }

    pub async fn get(&self, url: &str) -> Result<ApiResponse> {
        self.request(url, RequestOptions::get()).await
    }

    pub async fn delete(&self, url: &str) -> Result<ApiResponse> {
        self.request(url, RequestOptions::new(Method::DELETE)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<ApiResponse> {
        self.send_json(Method::POST, url, body).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<ApiResponse> {
        self.send_json(Method::PUT, url, body).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<ApiResponse> {
        self.send_json(Method::PATCH, url, body).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &T,
    ) -> Result<ApiResponse> {
        let body = Body::Json(serde_json::to_value(body)?);
        self.request(url, RequestOptions::new(method).body(body)).await
    }

    /// Current user as seen by the identity cache.
    pub async fn current_user(&self) -> Result<Option<Identity>> {
        let inner = &self.inner;
        inner.gate.ensure_ready(inner.provider.as_ref()).await;
        inner.identity.current_user(inner.provider.as_ref()).await
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            pool_size: self.inner.pool.len(),
            token_cache_size: self.inner.tokens.len(),
            ..self.inner.stats.snapshot()
        }
    }

    /// Drop cached tokens, the identity, in-flight reads and stats.
    pub async fn clear_cache(&self) {
        let inner = &self.inner;
        inner.tokens.clear();
        inner.pool.clear();
        inner.identity.clear().await;
        inner.stats.reset();
        tracing::debug!("Cleared auth caches");
    }

    /// Sign out with the provider, then clear every cache.
    pub async fn logout(&self) {
        if let Err(e) = self.inner.provider.sign_out().await {
            tracing::warn!(error = %e, "Sign-out failed, clearing local state anyway");
        }
        self.clear_cache().await;
    }

    async fn dispatch(
        &self,
        url: String,
        options: RequestOptions,
        span: &RequestSpan,
    ) -> Result<ApiResponse> {
        let inner = &self.inner;
        let started = Instant::now();

        let cancel = options.cancel.clone();
        let resolve = async {
            inner.gate.ensure_ready(inner.provider.as_ref()).await;
            inner.identity.current_user(inner.provider.as_ref()).await
        };
        let user = match until_cancelled(cancel.as_ref(), resolve).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                inner.stats.record_error();
                tracing::error!("Request rejected: no authenticated user");
                return Err(Error::NotAuthenticated);
            }
            Err(e) => {
                inner.stats.record_error();
                return Err(e);
            }
        };

        let (result, joined) = if options.is_deduplicated() {
            let key = options.dedup_key(&url);
            // The shared call outlives any single waiter, so it always runs
            // on its own clock.
            let timeout = Some(options.timeout.unwrap_or(inner.config.request_timeout));
            let operation = {
                let inner = inner.clone();
                let span = span.clone();
                move || {
                    let instrumented = span.span().clone();
                    inner
                        .execute(user, url, options, timeout, span)
                        .instrument(instrumented)
                        .boxed()
                }
            };

            let (shared, joined) = inner.pool.join_or_start(&key, operation);
            if joined {
                span.mark_dedup();
            }
            (until_cancelled(cancel.as_ref(), shared).await, joined)
        } else {
            let timeout = options.attempt_timeout(inner.config.request_timeout);
            let operation = inner
                .clone()
                .execute(user, url, options, timeout, span.clone());
            (until_cancelled(cancel.as_ref(), operation).await, false)
        };

        inner.stats.record(started.elapsed(), joined);
        if result.is_err() {
            inner.stats.record_error();
        }
        result
    }
}

impl ClientInner {
    async fn execute(
        self: Arc<Self>,
        user: Identity,
        url: String,
        options: RequestOptions,
        timeout: Option<Duration>,
        span: RequestSpan,
    ) -> Result<ApiResponse> {
        let token = self.initial_token(&user).await?;
        let response = self.send_once(&url, &options, &token, timeout).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return into_result(response);
        }

        span.mark_retried();
        tracing::debug!(user = %user.id, "Received 401, forcing token refresh");
        let cached = self.tokens.peek(&user.id);
        let retry_token = match self.tokens.get(&self.provider, &user.id, true).await {
            Ok(token) => token,
            Err(e) => match self.tokens.peek(&user.id).or(cached) {
                Some(stale) => {
                    self.stats.record_error();
                    tracing::warn!(user = %user.id, error = %e, "Forced refresh failed, retrying with cached token");
                    stale
                }
                None => return Err(e),
            },
        };

        let retry = self.send_once(&url, &options, &retry_token, timeout).await?;
        if retry.status == StatusCode::UNAUTHORIZED {
            tracing::error!(user = %user.id, "Still unauthorized after token refresh");
            return Err(Error::Unauthorized { body: retry.text() });
        }
        into_result(retry)
    }

    /// Token for the first attempt. A throttled provider falls back to the
    /// last token this user had, however old.
    async fn initial_token(&self, user: &Identity) -> Result<SecretString> {
        let cached = self.tokens.peek(&user.id);
        match self.tokens.get(&self.provider, &user.id, false).await {
            Ok(token) => Ok(token),
            Err(e) if e.is_quota_exceeded() => match self.tokens.peek(&user.id).or(cached) {
                Some(stale) => {
                    self.stats.record_error();
                    tracing::warn!(user = %user.id, error = %e, "Provider throttled, using cached token");
                    Ok(stale)
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn send_once(
        &self,
        url: &str,
        options: &RequestOptions,
        token: &SecretString,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse> {
        let request = self.prepare(url, options, token)?;
        let send = self.transport.send(request);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => send.await,
        }
    }

    fn prepare(
        &self,
        url: &str,
        options: &RequestOptions,
        token: &SecretString,
    ) -> Result<OutgoingRequest> {
        let mut request = OutgoingRequest::new(options.method.clone(), url);

        request.set_header(
            AUTHORIZATION.as_str(),
            &format!("Bearer {}", token.expose_secret()),
        )?;
        if let Some(value) = request.headers.get_mut(AUTHORIZATION) {
            value.set_sensitive(true);
        }
        request.set_header(&self.config.timezone_header, &self.config.timezone)?;

        for (name, value) in &options.headers {
            request.set_header(name, value)?;
        }
        if options.body.as_ref().is_some_and(Body::is_json_like) {
            request.set_header("content-type", "application/json")?;
        }

        request.body = options.body.clone();
        Ok(request)
    }
}

fn into_result(response: ApiResponse) -> Result<ApiResponse> {
    if response.status.is_success() {
        Ok(response)
    } else {
        Err(Error::Http {
            status: response.status.as_u16(),
            body: response.text(),
        })
    }
}

async fn until_cancelled<T>(
    cancel: Option<&CancellationToken>,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            result = operation => result,
        },
        None => operation.await,
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("provider", &self.inner.provider.name())
            .field("base_url", &self.inner.config.base_url)
            .finish()
    }
}

#[derive(Default)]
pub struct AuthClientBuilder {
    config: Option<ClientConfig>,
    provider: Option<Arc<dyn IdentityProvider>>,
    transport: Option<Arc<dyn Transport>>,
}

impl AuthClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn provider(mut self, provider: impl IdentityProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Use a provider the caller keeps a handle to.
    pub fn shared_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<AuthClient> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let provider = self
            .provider
            .ok_or_else(|| Error::Config("an identity provider is required".into()))?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_network(config.network.as_ref())?),
        };

        let stats = Arc::new(StatsCollector::with_window(config.stats_window));
        let inner = ClientInner {
            gate: ReadinessGate::new(),
            identity: IdentityCache::with_intervals(
                config.identity_fast_ttl,
                config.identity_revalidate_interval,
            ),
            tokens: TokenCache::with_ttl(config.token_ttl, stats.clone()),
            pool: RequestPool::new(),
            stats,
            config,
            provider,
            transport,
        };

        Ok(AuthClient {
            inner: Arc::new(inner),
        })
    }
}
