//! Per-user bearer token cache with coalesced refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use secrecy::SecretString;
use tokio::time::Instant;

use super::token_source::valid_token;
use super::{IdentityProvider, UserId};
use crate::observability::StatsCollector;
use crate::{Error, Result};

/// Tokens younger than this are served without calling the provider.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(4 * 60);

type SharedRefresh = Shared<BoxFuture<'static, Result<SecretString>>>;

struct CachedToken {
    token: SecretString,
    obtained_at: Instant,
}

struct InFlight {
    id: u64,
    refresh: SharedRefresh,
}

#[derive(Default)]
struct TokenSlot {
    cached: Option<CachedToken>,
    in_flight: Option<InFlight>,
}

/// Bearer tokens keyed by user.
///
/// At most one refresh runs per user. It runs as its own task, so a caller
/// that stops waiting does not cancel it for the others; the task publishes
/// the result into the slot only if the slot still points at it.
pub struct TokenCache {
    slots: Arc<DashMap<UserId, TokenSlot>>,
    ttl: Duration,
    next_refresh_id: AtomicU64,
    stats: Arc<StatsCollector>,
}

impl TokenCache {
    pub fn new(stats: Arc<StatsCollector>) -> Self {
        Self::with_ttl(DEFAULT_TOKEN_TTL, stats)
    }

    pub fn with_ttl(ttl: Duration, stats: Arc<StatsCollector>) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            ttl,
            next_refresh_id: AtomicU64::new(0),
            stats,
        }
    }

    /// Return a bearer token for `user`, refreshing through `provider` when the
    /// cached one is missing, stale, or `force_refresh` is set.
    pub async fn get(
        &self,
        provider: &Arc<dyn IdentityProvider>,
        user: &UserId,
        force_refresh: bool,
    ) -> Result<SecretString> {
        let refresh = {
            let mut slot = self.slots.entry(*user).or_default();

            if !force_refresh
                && let Some(cached) = &slot.cached
                && cached.obtained_at.elapsed() < self.ttl
            {
                return Ok(cached.token.clone());
            }

            match &slot.in_flight {
                Some(in_flight) => {
                    tracing::debug!(user = %user, "Joining in-flight token refresh");
                    in_flight.refresh.clone()
                }
                None => {
                    let id = self.next_refresh_id.fetch_add(1, Ordering::Relaxed);
                    let refresh = self.spawn_refresh(provider.clone(), *user, id);
                    slot.in_flight = Some(InFlight {
                        id,
                        refresh: refresh.clone(),
                    });
                    refresh
                }
            }
        };

        refresh.await
    }

    fn spawn_refresh(
        &self,
        provider: Arc<dyn IdentityProvider>,
        user: UserId,
        id: u64,
    ) -> SharedRefresh {
        let slots = self.slots.clone();
        let stats = self.stats.clone();

        tracing::debug!(user = %user, provider = provider.name(), "Refreshing bearer token");
        let task = tokio::spawn(async move {
            let result = valid_token(provider.as_ref()).await;
            let owns_slot =
                |slot: &TokenSlot| slot.in_flight.as_ref().is_some_and(|f| f.id == id);

            match &result {
                Ok(token) => {
                    stats.record_token_refresh();
                    if let Some(mut slot) = slots.get_mut(&user)
                        && owns_slot(&*slot)
                    {
                        *slot = TokenSlot {
                            cached: Some(CachedToken {
                                token: token.clone(),
                                obtained_at: Instant::now(),
                            }),
                            in_flight: None,
                        };
                    }
                }
                Err(e) => {
                    tracing::warn!(user = %user, error = %e, "Token refresh failed, evicting entry");
                    slots.remove_if(&user, |_, slot| owns_slot(slot));
                }
            }
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(Error::Internal(format!("token refresh task failed: {e}"))))
        }
        .boxed()
        .shared()
    }

    /// Last cached token for `user`, regardless of age.
    pub fn peek(&self, user: &UserId) -> Option<SecretString> {
        self.slots
            .get(user)
            .and_then(|slot| slot.cached.as_ref().map(|c| c.token.clone()))
    }

    /// Age of the cached token for `user`.
    pub fn age(&self, user: &UserId) -> Option<Duration> {
        self.slots
            .get(user)
            .and_then(|slot| slot.cached.as_ref().map(|c| c.obtained_at.elapsed()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}
