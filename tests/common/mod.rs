//! Instrumented provider and transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use authfetch::client::{ApiResponse, OutgoingRequest, Transport};
use authfetch::{
    AuthClient, ClientConfig, Error, Identity, IdentityProvider, Result, Session, UserId,
};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

/// Provider whose sessions always sit inside the refresh margin, so every
/// token fetch goes through `refresh_session` and mints `token-N`.
pub struct MintingProvider {
    pub user: Identity,
    session: Mutex<Option<Session>>,
    signed_out: AtomicBool,
    throttled: AtomicBool,
    refresh_delay: Duration,
    pub session_reads: AtomicUsize,
    pub user_reads: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub sign_outs: AtomicUsize,
}

impl MintingProvider {
    pub fn signed_in() -> Arc<Self> {
        let user = Identity::new(UserId::random()).with_email("ana@example.com");
        let session = Self::session_for("token-0", &user);
        Arc::new(Self::with_session(user, Some(session)))
    }

    pub fn signed_out() -> Arc<Self> {
        let provider = Self::with_session(Identity::new(UserId::random()), None);
        provider.signed_out.store(true, Ordering::SeqCst);
        Arc::new(provider)
    }

    fn with_session(user: Identity, session: Option<Session>) -> Self {
        Self {
            user,
            session: Mutex::new(session),
            signed_out: AtomicBool::new(false),
            throttled: AtomicBool::new(false),
            refresh_delay: Duration::from_millis(10),
            session_reads: AtomicUsize::new(0),
            user_reads: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
        }
    }

    fn session_for(token: &str, user: &Identity) -> Session {
        Session::new(token, user.clone())
            .with_refresh_token("refresh")
            .with_expiry(chrono::Utc::now() + chrono::Duration::seconds(60))
    }

    /// Drop the local session while the auth server still knows the user.
    pub fn forget_session(&self) {
        *self.session.lock().unwrap() = None;
    }

    pub fn set_throttled(&self, throttled: bool) {
        self.throttled.store(throttled, Ordering::SeqCst);
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn user_reads(&self) -> usize {
        self.user_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MintingProvider {
    fn name(&self) -> &str {
        "minting"
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        self.session_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.session.lock().unwrap().clone())
    }

    async fn get_user(&self) -> Result<Option<Identity>> {
        self.user_reads.fetch_add(1, Ordering::SeqCst);
        if self.signed_out.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.user.clone()))
    }

    async fn refresh_session(&self) -> Result<Option<Session>> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.refresh_delay).await;
        if self.throttled.load(Ordering::SeqCst) {
            return Err(Error::quota_exceeded("over_request_rate_limit"));
        }

        let mut slot = self.session.lock().unwrap();
        if slot.is_none() {
            return Ok(None);
        }
        let session = Self::session_for(&format!("token-{n}"), &self.user);
        *slot = Some(session.clone());
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.signed_out.store(true, Ordering::SeqCst);
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

/// Transport that records every attempt and answers from a script.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<(u16, &'static str)>>,
    requests: Mutex<Vec<OutgoingRequest>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::from_millis(100))
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    /// Queue responses; once the script runs out every call gets `200 {}`.
    pub fn respond(&self, status: u16, body: &'static str) {
        self.script.lock().unwrap().push_back((status, body));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<OutgoingRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bearer(&self, index: usize) -> String {
        self.requests()[index]
            .header("authorization")
            .unwrap_or_default()
            .trim_start_matches("Bearer ")
            .to_string()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<ApiResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        tokio::time::sleep(self.delay).await;

        let (status, body) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((200, "{}"));
        let status = StatusCode::from_u16(status).unwrap();
        Ok(ApiResponse::new(status, HeaderMap::new(), body))
    }
}

pub fn client(provider: &Arc<MintingProvider>, transport: &Arc<ScriptedTransport>) -> AuthClient {
    AuthClient::builder()
        .config(
            ClientConfig::default()
                .base_url("https://app.example.com")
                .timezone("America/Sao_Paulo"),
        )
        .shared_provider(provider.clone())
        .shared_transport(transport.clone())
        .build()
        .unwrap()
}
