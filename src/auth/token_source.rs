//! Valid-token policy on top of an [`IdentityProvider`].

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};

use super::IdentityProvider;
use crate::{Error, Result};

/// Sessions expiring sooner than this (in seconds) are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// Obtain a usable access token from the provider.
///
/// A failed refresh of an existing session falls back to that session's
/// token. Without a local session, quota errors propagate untouched so
/// callers can fall back to a cached token; every other failure becomes
/// [`Error::TokenRefresh`].
pub async fn valid_token(provider: &dyn IdentityProvider) -> Result<SecretString> {
    let session = provider.get_session().await.map_err(refresh_error)?;

    let token = match session {
        Some(session) if session.expires_within(Duration::seconds(REFRESH_MARGIN_SECS)) => {
            tracing::debug!(provider = provider.name(), "Session close to expiry, refreshing");
            match provider.refresh_session().await {
                Ok(Some(fresh)) => fresh.access_token,
                Ok(None) => session.access_token,
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "Session refresh failed, using current access token"
                    );
                    session.access_token
                }
            }
        }
        Some(session) => session.access_token,
        None => {
            tracing::debug!(provider = provider.name(), "No local session, attempting refresh");
            match provider.refresh_session().await.map_err(refresh_error)? {
                Some(fresh) => fresh.access_token,
                None => return Err(Error::token_refresh("no active session")),
            }
        }
    };

    if token.expose_secret().is_empty() {
        return Err(Error::token_refresh("provider returned an empty access token"));
    }
    Ok(token)
}

fn refresh_error(err: Error) -> Error {
    match err {
        Error::ProviderQuotaExceeded { .. } | Error::TokenRefresh { .. } => err,
        other => Error::token_refresh(other.to_string()),
    }
}
