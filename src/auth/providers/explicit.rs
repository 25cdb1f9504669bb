//! Static session provider.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;
use crate::auth::{Identity, IdentityProvider, Session};

/// Provider backed by an explicitly supplied session.
///
/// Useful for service accounts, embedding a session obtained elsewhere, and
/// tests. Refreshing returns the current session unchanged.
#[derive(Debug, Default)]
pub struct StaticProvider {
    session: RwLock<Option<Session>>,
}

impl StaticProvider {
    /// Create with session.
    pub fn new(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }

    /// Create without a session; every lookup reports "signed out".
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the current session.
    pub async fn set_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    /// Drop the current session.
    pub async fn clear(&self) {
        *self.session.write().await = None;
    }
}

#[async_trait]
impl IdentityProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        Ok(self.session.read().await.clone())
    }

    async fn get_user(&self) -> Result<Option<Identity>> {
        Ok(self
            .session
            .read()
            .await
            .as_ref()
            .filter(|s| !s.is_expired())
            .map(|s| s.user.clone()))
    }

    async fn refresh_session(&self) -> Result<Option<Session>> {
        self.get_session().await
    }

    async fn sign_out(&self) -> Result<()> {
        self.clear().await;
        Ok(())
    }
}
