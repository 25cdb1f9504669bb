//! Identity provider implementations.

mod explicit;
mod gotrue;

pub use explicit::StaticProvider;
pub use gotrue::GoTrueProvider;
