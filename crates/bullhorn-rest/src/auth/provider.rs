//! Session authentication trait
//!
//! This module defines the [`SessionAuth`] trait the request gateway relies
//! on. [`SessionManager`](super::SessionManager) is the production
//! implementation; tests and embedders may supply their own.

use super::types::{AuthResult, SessionOptions};
use async_trait::async_trait;

/// Owner of a REST session: its token, its base URL and its renewal.
///
/// Reads go straight to the backing store on every call, so a session
/// written by another instance sharing the store is observed immediately.
#[async_trait]
pub trait SessionAuth: Send + Sync {
    /// Current `BhRestToken`, if any
    async fn rest_token(&self) -> AuthResult<Option<String>>;

    /// Current per-session REST base URL, if any
    async fn rest_url(&self) -> AuthResult<Option<String>>;

    /// Current refresh token, if any
    async fn refresh_token(&self) -> AuthResult<Option<String>>;

    /// Whether both the REST token and URL are present. Performs no network I/O.
    async fn session_is_valid(&self) -> AuthResult<bool>;

    /// Run the full login handshake and persist the new session
    async fn initiate_session(&self, options: &SessionOptions) -> AuthResult<()>;

    /// Renew the session with the stored refresh token
    async fn refresh_session(&self, options: &SessionOptions) -> AuthResult<()>;

    /// Get provider name for logging/debugging
    fn name(&self) -> &str {
        "session"
    }
}
