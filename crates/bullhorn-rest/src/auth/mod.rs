//! Session authentication for the Bullhorn REST API
//!
//! This module owns the three-leg handshake:
//! - authorization code fetched from the login form with the user's credentials
//! - OAuth2 token exchange (authorization code or refresh token)
//! - REST login turning an access token into a `BhRestToken` and REST URL
//!
//! Session values are persisted through a pluggable [`DataStore`] so several
//! clients sharing one store reuse the same session.

pub mod credentials;
pub mod manager;
pub mod oauth;
pub mod provider;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use credentials::{
    CredentialsProvider, EnvironmentCredentialsProvider, EnvironmentKeys,
    MemoryCredentialsProvider,
};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use oauth::{ExchangedTokens, OAuth2TokenExchange, TokenExchange};
pub use provider::SessionAuth;
pub use store::{DataStore, LocalFileDataStore, MemoryDataStore};
pub use types::{
    AuthEndpoints, AuthError, AuthResult, HttpClientFactory, ResolvedKeys, SessionOptions,
    SessionRecord, SessionState, StorageKeys,
};
