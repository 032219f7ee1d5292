//! Client configuration
//!
//! Settings are layered with figment: built-in defaults, then an optional
//! TOML file, then `BULLHORN_REST_*` environment variables (nested keys
//! separated by `__`, e.g. `BULLHORN_REST_SESSION__TTL=5`).

use crate::auth::{AuthEndpoints, SessionOptions, StorageKeys};
use crate::error::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "BULLHORN_REST_";

/// Default number of handshake attempts per session establishment
pub const DEFAULT_MAX_SESSION_REFRESH_TRIES: u32 = 5;

/// Default base delay in milliseconds between handshake attempts
pub const DEFAULT_RETRY_DELAY_MS: u64 = 250;

/// Default timeout in seconds for API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Main configuration structure for the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Refresh the session and retry once when a request hits an expired token
    pub auto_refresh_sessions: bool,

    /// Attempts allowed for a handshake that fails with transient errors
    pub max_session_refresh_tries: u32,

    /// Base delay before a handshake retry, doubled per attempt
    pub session_retry_delay_ms: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Handshake endpoints
    pub endpoints: AuthEndpoints,

    /// Data store key templates
    pub storage_keys: StorageKeys,

    /// REST login parameters used for implicit session starts and refreshes
    pub session: SessionOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auto_refresh_sessions: true,
            max_session_refresh_tries: DEFAULT_MAX_SESSION_REFRESH_TRIES,
            session_retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            endpoints: AuthEndpoints::default(),
            storage_keys: StorageKeys::default(),
            session: SessionOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from defaults and environment
    pub fn load() -> Result<Self> {
        let config = Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, with environment overrides on top
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config = Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.session_retry_delay_ms)
    }

    /// Handshake attempts, never less than one
    pub fn session_attempts(&self) -> u32 {
        self.max_session_refresh_tries.max(1)
    }
}
