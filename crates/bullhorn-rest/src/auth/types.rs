//! Authentication-related types and data structures
//!
//! This module defines the types shared by the session manager, the token
//! exchange and the data stores: endpoint configuration, storage key
//! templates, REST-login options, the persisted session record and the
//! authentication error taxonomy.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Produces a fresh `reqwest::ClientBuilder` for every HTTP client the crate builds
pub type HttpClientFactory = Arc<dyn Fn() -> reqwest::ClientBuilder + Send + Sync>;

/// Delay before retry number `attempt` (1-based): `base`, doubled per attempt, capped at 8x
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.saturating_sub(1).min(3))
}

/// Placeholder substituted with the client id in storage key templates
pub const CLIENT_ID_PLACEHOLDER: &str = "{{clientId}}";

/// Default OAuth authorization endpoint
pub const DEFAULT_AUTHORIZE_URL: &str = "https://auth.bullhornstaffing.com/oauth/authorize";

/// Default OAuth token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://auth.bullhornstaffing.com/oauth/token";

/// Default REST login endpoint
pub const DEFAULT_LOGIN_URL: &str = "https://rest.bullhornstaffing.com/rest-services/login";

/// Endpoints used during the login handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEndpoints {
    /// OAuth authorization endpoint (login form submission)
    pub authorize_url: String,
    /// OAuth token endpoint (code and refresh-token grants)
    pub token_url: String,
    /// REST login endpoint exchanging an access token for a session
    pub login_url: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
        }
    }
}

impl AuthEndpoints {
    /// Endpoints rooted at a single host, laid out like the production services.
    ///
    /// Mostly useful against mock servers and regional deployments.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            authorize_url: format!("{base}/oauth/authorize"),
            token_url: format!("{base}/oauth/token"),
            login_url: format!("{base}/rest-services/login"),
        }
    }
}

/// Storage key templates for the three session artifacts.
///
/// Every template may contain `{{clientId}}`, which is replaced by the
/// client id so several client ids can share one data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub rest_token: String,
    pub rest_url: String,
    pub refresh_token: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            rest_token: format!("{CLIENT_ID_PLACEHOLDER}-rest-token"),
            rest_url: format!("{CLIENT_ID_PLACEHOLDER}-rest-url"),
            refresh_token: format!("{CLIENT_ID_PLACEHOLDER}-refresh-token"),
        }
    }
}

impl StorageKeys {
    /// Resolve the templates for a given client id
    pub fn resolve(&self, client_id: &str) -> ResolvedKeys {
        ResolvedKeys {
            rest_token: self.rest_token.replace(CLIENT_ID_PLACEHOLDER, client_id),
            rest_url: self.rest_url.replace(CLIENT_ID_PLACEHOLDER, client_id),
            refresh_token: self.refresh_token.replace(CLIENT_ID_PLACEHOLDER, client_id),
        }
    }
}

/// Storage keys with the client id substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKeys {
    pub rest_token: String,
    pub rest_url: String,
    pub refresh_token: String,
}

/// Query parameters sent with the REST login request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// REST API version
    pub version: String,
    /// Session time-to-live in minutes
    pub ttl: u32,
    /// Additional login parameters
    pub extra: Vec<(String, String)>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            version: "2.0".to_string(),
            ttl: 60,
            extra: Vec::new(),
        }
    }
}

impl SessionOptions {
    /// Override the session time-to-live
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Add an extra login parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    /// Login query pairs; `access_token` always comes last and wins over
    /// anything in `extra`.
    pub(crate) fn login_query(&self, access_token: &str) -> Vec<(String, String)> {
        let mut query = vec![
            ("version".to_string(), self.version.clone()),
            ("ttl".to_string(), self.ttl.to_string()),
        ];
        for (key, value) in &self.extra {
            match key.as_str() {
                "access_token" => continue,
                "version" | "ttl" => {
                    query.retain(|(k, _)| k != key);
                    query.push((key.clone(), value.clone()));
                }
                _ => query.push((key.clone(), value.clone())),
            }
        }
        query.push(("access_token".to_string(), access_token.to_string()));
        query
    }
}

/// Response body of a successful REST login
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RestLoginResponse {
    #[serde(rename = "BhRestToken")]
    pub rest_token: String,
    #[serde(rename = "restUrl")]
    pub rest_url: String,
}

/// Session artifacts as persisted in a data store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    pub rest_token: Option<String>,
    pub rest_url: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionRecord {
    /// A session is usable when both the REST token and URL are non-empty
    pub fn is_valid(&self) -> bool {
        non_empty(&self.rest_token) && non_empty(&self.rest_url)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Lifecycle state of a session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The authorization endpoint rejected the client id
    #[error("Invalid client id")]
    InvalidClientId,

    /// The token endpoint rejected the client secret
    #[error("Invalid client secret")]
    InvalidClientSecret,

    /// The login form rejected the username or password
    #[error("Invalid user credentials")]
    InvalidUserCredentials,

    /// The token endpoint rejected the authorization code
    #[error("Invalid authorization code")]
    InvalidAuthCode,

    /// No refresh token is stored, or the stored one was rejected
    #[error("Invalid refresh token: {0}")]
    InvalidRefreshToken(String),

    /// The REST login endpoint answered with a non-200 status
    #[error("Failed to create REST session (status {status})")]
    CreateSessionFailure { status: u16 },

    /// The REST login request could not be sent or read
    #[error("REST login failed: {0}")]
    RestLoginFailure(String),

    /// Generic handshake failure
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Network error talking to the token endpoint
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Session data store error
    #[error("Session storage error: {0}")]
    StorageError(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl AuthError {
    /// Transport-level failures that a bounded retry may recover from.
    /// Everything else indicates bad input.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::NetworkError(_) | AuthError::RestLoginFailure(_)
        )
    }

    /// Transient failures after which the whole handshake may run again.
    ///
    /// A REST login failure happens after the code or refresh token was
    /// consumed; only that step is retried, with the access token in hand.
    pub fn restarts_handshake(&self) -> bool {
        matches!(self, AuthError::NetworkError(_))
    }
}
