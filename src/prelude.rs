//! Common imports.
//!
//! ```rust
//! use authfetch::prelude::*;
//! ```

pub use crate::auth::{
    GoTrueProvider, Identity, IdentityProvider, Session, StaticProvider, UserId,
};
pub use crate::client::{
    ApiResponse, AuthClient, Body, ClientConfig, MultipartBody, RequestOptions, Transport,
};
pub use crate::config::{ConfigSource, EnvConfigSource, FileConfigSource, LayeredConfig};
pub use crate::observability::FetchStats;
pub use crate::{Error, Result};
