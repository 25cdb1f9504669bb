//! Two-tier identity cache.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{Identity, IdentityProvider};
use crate::Result;

/// How long a resolved identity is served without any provider call.
pub const DEFAULT_FAST_TTL: Duration = Duration::from_secs(5);
/// Upper bound on how long identity may be trusted from local state alone.
pub const DEFAULT_REVALIDATE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct IdentityState {
    user: Option<Identity>,
    resolved_at: Option<Instant>,
    last_server_validated_at: Option<Instant>,
}

/// Caches the current user with a short (local) and a long (server) clock.
///
/// The lock is held across the provider call so concurrent lookups resolve
/// once and the rest read the refreshed entry.
pub struct IdentityCache {
    state: Mutex<IdentityState>,
    fast_ttl: Duration,
    revalidate_interval: Duration,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::with_intervals(DEFAULT_FAST_TTL, DEFAULT_REVALIDATE_INTERVAL)
    }

    pub fn with_intervals(fast_ttl: Duration, revalidate_interval: Duration) -> Self {
        Self {
            state: Mutex::new(IdentityState::default()),
            fast_ttl,
            revalidate_interval,
        }
    }

    pub async fn current_user(&self, provider: &dyn IdentityProvider) -> Result<Option<Identity>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let needs_revalidation = state
            .last_server_validated_at
            .is_none_or(|at| now.duration_since(at) >= self.revalidate_interval);

        let user = if needs_revalidation {
            tracing::debug!(provider = provider.name(), "Revalidating identity with auth server");
            let user = provider.get_user().await?;
            state.last_server_validated_at = Some(now);
            user
        } else if let (Some(user), Some(at)) = (&state.user, state.resolved_at)
            && now.duration_since(at) < self.fast_ttl
        {
            return Ok(Some(user.clone()));
        } else {
            provider.get_session().await?.map(|s| s.user)
        };

        state.user = user.clone();
        state.resolved_at = Some(now);
        Ok(user)
    }

    /// Currently cached identity without touching the provider.
    pub async fn peek(&self) -> Option<Identity> {
        self.state.lock().await.user.clone()
    }

    pub async fn clear(&self) {
        *self.state.lock().await = IdentityState::default();
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new()
    }
}
