//! Credential providers
//!
//! A credentials provider supplies the OAuth client id/secret and the API
//! user's username/password. Environment-backed and in-memory providers are
//! included; anything else (a secret manager, a vault) can implement
//! [`CredentialsProvider`] directly.

use super::types::{AuthError, AuthResult};
use std::env;
use std::fmt;
use tracing::debug;

/// Default environment variable holding the client id
pub const ENV_CLIENT_ID: &str = "BULLHORN_CLIENT_ID";
/// Default environment variable holding the client secret
pub const ENV_CLIENT_SECRET: &str = "BULLHORN_CLIENT_SECRET";
/// Default environment variable holding the API username
pub const ENV_USERNAME: &str = "BULLHORN_USERNAME";
/// Default environment variable holding the API password
pub const ENV_PASSWORD: &str = "BULLHORN_PASSWORD";

/// Source of the client and user credentials
pub trait CredentialsProvider: Send + Sync {
    fn client_id(&self) -> &str;
    fn client_secret(&self) -> &str;
    fn username(&self) -> &str;
    fn password(&self) -> &str;
}

/// Reject providers that hand out empty values
pub(crate) fn validate(provider: &dyn CredentialsProvider) -> AuthResult<()> {
    let fields = [
        ("client id", provider.client_id()),
        ("client secret", provider.client_secret()),
        ("username", provider.username()),
        ("password", provider.password()),
    ];
    for (name, value) in fields {
        if value.is_empty() {
            return Err(AuthError::ConfigError(format!(
                "credentials provider returned an empty {name}"
            )));
        }
    }
    Ok(())
}

/// Credentials held in memory.
///
/// Convenient for tests and short-lived tools; prefer a provider backed by
/// a secret store in production.
#[derive(Clone)]
pub struct MemoryCredentialsProvider {
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
}

impl MemoryCredentialsProvider {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl CredentialsProvider for MemoryCredentialsProvider {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn client_secret(&self) -> &str {
        &self.client_secret
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for MemoryCredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCredentialsProvider")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Names of the environment variables read by [`EnvironmentCredentialsProvider`]
#[derive(Debug, Clone)]
pub struct EnvironmentKeys {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl Default for EnvironmentKeys {
    fn default() -> Self {
        Self {
            client_id: ENV_CLIENT_ID.to_string(),
            client_secret: ENV_CLIENT_SECRET.to_string(),
            username: ENV_USERNAME.to_string(),
            password: ENV_PASSWORD.to_string(),
        }
    }
}

/// Credentials read from environment variables.
///
/// Values are captured once at construction, which fails fast when any
/// variable is missing or empty.
#[derive(Clone)]
pub struct EnvironmentCredentialsProvider {
    inner: MemoryCredentialsProvider,
}

impl EnvironmentCredentialsProvider {
    /// Read the default `BULLHORN_*` variables
    pub fn from_env() -> AuthResult<Self> {
        Self::with_keys(EnvironmentKeys::default())
    }

    /// Read credentials from custom variable names
    pub fn with_keys(keys: EnvironmentKeys) -> AuthResult<Self> {
        let read = |key: &str| -> AuthResult<String> {
            match env::var(key) {
                Ok(value) if !value.is_empty() => Ok(value),
                _ => Err(AuthError::ConfigError(format!(
                    "environment credentials used without {key} set"
                ))),
            }
        };

        let inner = MemoryCredentialsProvider::new(
            read(&keys.client_id)?,
            read(&keys.client_secret)?,
            read(&keys.username)?,
            read(&keys.password)?,
        );
        debug!("Loaded credentials for client {} from environment", inner.client_id);

        Ok(Self { inner })
    }
}

impl CredentialsProvider for EnvironmentCredentialsProvider {
    fn client_id(&self) -> &str {
        self.inner.client_id()
    }

    fn client_secret(&self) -> &str {
        self.inner.client_secret()
    }

    fn username(&self) -> &str {
        self.inner.username()
    }

    fn password(&self) -> &str {
        self.inner.password()
    }
}

impl fmt::Debug for EnvironmentCredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentCredentialsProvider")
            .field("client_id", &self.inner.client_id)
            .finish_non_exhaustive()
    }
}
