//! Supabase/GoTrue identity provider.
//!
//! The in-memory session slot plays the role of the browser's local storage:
//! [`IdentityProvider::get_session`] reads it without any network traffic,
//! while [`IdentityProvider::get_user`] asks the auth server to validate the
//! access token.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

use crate::auth::{Identity, IdentityProvider, Session, UserId};
use crate::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity provider talking to a GoTrue auth server (`/auth/v1`).
pub struct GoTrueProvider {
    base_url: Url,
    anon_key: SecretString,
    http: reqwest::Client,
    session: RwLock<Option<Session>>,
}

impl std::fmt::Debug for GoTrueProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoTrueProvider")
            .field("base_url", &self.base_url.as_str())
            .field("anon_key", &"[redacted]")
            .finish()
    }
}

impl GoTrueProvider {
    pub fn new(project_url: &str, anon_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Self::with_http(project_url, anon_key, http)
    }

    pub fn with_http(
        project_url: &str,
        anon_key: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let mut base_url = Url::parse(project_url)
            .map_err(|e| Error::Config(format!("invalid auth server URL {project_url}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            anon_key: SecretString::from(anon_key.into()),
            http,
            session: RwLock::new(None),
        })
    }

    /// Hydrate the local session, e.g. from a previously persisted login.
    pub async fn set_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Sign in with email and password and store the resulting session.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.endpoint("auth/v1/token?grant_type=password")?;
        let response = self
            .http
            .post(url)
            .header("apikey", self.anon_key.expose_secret())
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(auth_server_unreachable)?;

        let status = response.status();
        let body = response.text().await.map_err(auth_server_unreachable)?;
        if !status.is_success() {
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                    Error::token_refresh(format!("sign-in rejected: {}", error_message(&body)))
                }
                _ => classify(status, &body),
            });
        }

        let session = serde_json::from_str::<SessionPayload>(&body)?.into_session();
        tracing::debug!(user = %session.user.id, "Signed in");
        self.set_session(session.clone()).await;
        Ok(session)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl IdentityProvider for GoTrueProvider {
    fn name(&self) -> &str {
        "gotrue"
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        Ok(self.current_session().await)
    }

    async fn get_user(&self) -> Result<Option<Identity>> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };

        let response = self
            .http
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(session.access_token.expose_secret())
            .send()
            .await
            .map_err(auth_server_unreachable)?;

        let status = response.status();
        let body = response.text().await.map_err(auth_server_unreachable)?;
        match status {
            s if s.is_success() => {
                let user: UserPayload = serde_json::from_str(&body)?;
                let mut identity = user.into_identity();
                identity.expires_at = session.expires_at;
                Ok(Some(identity))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!(status = status.as_u16(), "Access token rejected by auth server");
                Ok(None)
            }
            _ => Err(classify(status, &body)),
        }
    }

    async fn refresh_session(&self) -> Result<Option<Session>> {
        let Some(refresh_token) = self
            .current_session()
            .await
            .and_then(|s| s.refresh_token)
        else {
            return Ok(None);
        };

        let response = self
            .http
            .post(self.endpoint("auth/v1/token?grant_type=refresh_token")?)
            .header("apikey", self.anon_key.expose_secret())
            .json(&serde_json::json!({ "refresh_token": refresh_token.expose_secret() }))
            .send()
            .await
            .map_err(auth_server_unreachable)?;

        let status = response.status();
        let body = response.text().await.map_err(auth_server_unreachable)?;
        if status.is_success() {
            let session = serde_json::from_str::<SessionPayload>(&body)?.into_session();
            tracing::debug!(user = %session.user.id, "Session refreshed");
            self.set_session(session.clone()).await;
            return Ok(Some(session));
        }

        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED if !is_rate_limited(status, &body) => {
                *self.session.write().await = None;
                Err(Error::token_refresh(format!(
                    "refresh token rejected: {}",
                    error_message(&body)
                )))
            }
            _ => Err(classify(status, &body)),
        }
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };

        let result = self
            .http
            .post(self.endpoint("auth/v1/logout")?)
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(session.access_token.expose_secret())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(status = response.status().as_u16(), "Auth server logout failed");
            }
            Err(e) => tracing::warn!(error = %e, "Auth server logout failed"),
        }
        Ok(())
    }
}

fn auth_server_unreachable(err: reqwest::Error) -> Error {
    Error::provider(format!("auth server unreachable: {err}"))
}

fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let lowered = body.to_lowercase();
    lowered.contains("over_request_rate_limit")
        || lowered.contains("rate limit")
        || lowered.contains("quota-exceeded")
}

fn classify(status: StatusCode, body: &str) -> Error {
    if is_rate_limited(status, body) {
        Error::quota_exceeded(error_message(body))
    } else {
        Error::provider(format!("HTTP {}: {}", status.as_u16(), error_message(body)))
    }
}

#[derive(Deserialize, Default)]
struct ErrorPayload {
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn error_message(body: &str) -> String {
    let payload: ErrorPayload = serde_json::from_str(body).unwrap_or_default();
    payload
        .msg
        .or(payload.error_description)
        .or(payload.message)
        .or(payload.error_code)
        .or(payload.error)
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Deserialize)]
struct UserPayload {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl UserPayload {
    fn into_identity(self) -> Identity {
        Identity {
            id: UserId(self.id),
            email: self.email.filter(|e| !e.is_empty()),
            role: self.role,
            expires_at: None,
            claims: self.rest,
        }
    }
}

#[derive(Deserialize)]
struct SessionPayload {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserPayload,
}

impl SessionPayload {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                self.expires_in
                    .and_then(chrono::TimeDelta::try_seconds)
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            });

        let mut user = self.user.into_identity();
        user.expires_at = expires_at;
        Session {
            access_token: SecretString::from(self.access_token),
            refresh_token: self.refresh_token.map(SecretString::from),
            expires_at,
            user,
        }
    }
}
