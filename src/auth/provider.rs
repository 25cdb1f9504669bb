//! Identity provider trait.

use async_trait::async_trait;

use super::{Identity, Session};
use crate::Result;

/// Contract of the external identity provider.
///
/// The client only relies on these operations; how the provider stores or
/// validates sessions is its own business.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name for debugging.
    fn name(&self) -> &str;

    /// Local session read. Must not hit the network.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Authoritative, server-validated lookup of the current user.
    async fn get_user(&self) -> Result<Option<Identity>>;

    /// Exchange the refresh token for a new session.
    async fn refresh_session(&self) -> Result<Option<Session>>;

    /// End the session with the provider.
    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}
