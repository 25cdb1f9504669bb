//! Authentication state for the client.
//!
//! - **Readiness gate**: waits once for the provider to hydrate its session
//! - **Identity cache**: current user with a fast local and a slow server clock
//! - **Token cache**: per-user bearer tokens with a single in-flight refresh
//! - **Providers**: GoTrue (Supabase) over HTTP, or a static session

mod gate;
mod identity;
mod identity_cache;
mod provider;
mod providers;
mod token_cache;
pub mod token_source;

pub use gate::ReadinessGate;
pub use identity::{Identity, Session, UserId};
pub use identity_cache::{DEFAULT_FAST_TTL, DEFAULT_REVALIDATE_INTERVAL, IdentityCache};
pub use provider::IdentityProvider;
pub use providers::{GoTrueProvider, StaticProvider};
pub use token_cache::{DEFAULT_TOKEN_TTL, TokenCache};
