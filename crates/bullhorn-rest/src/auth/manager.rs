//! REST session management
//!
//! The SessionManager owns the handshake that turns raw credentials into a
//! usable REST session:
//!
//! 1. submit the login form to the authorization endpoint (redirects off)
//!    and pull the authorization code out of the `Location` header
//! 2. exchange the code for an access token
//! 3. exchange the access token for a `BhRestToken` and REST URL
//! 4. persist the session in the data store
//!
//! Refresh replaces step 1-2 with a refresh-token grant. Nothing is persisted
//! until every step before it has succeeded.

use super::credentials::{self, CredentialsProvider};
use super::oauth::{ExchangedTokens, OAuth2TokenExchange, TokenExchange};
use super::provider::SessionAuth;
use super::store::DataStore;
use super::types::{
    backoff_delay, AuthEndpoints, AuthError, AuthResult, HttpClientFactory, ResolvedKeys,
    RestLoginResponse, SessionOptions, SessionRecord, SessionState, StorageKeys,
};
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Body marker of the authorization page rejecting the client id
const INVALID_CLIENT_ID_MARKER: &str = "Invalid Client Id";

/// Body marker of the login form re-rendered with a credentials error
const CREDENTIALS_ERROR_MARKER: &str = "<p class=\"error\">";

/// REST login attempts per handshake unless configured otherwise
const DEFAULT_LOGIN_ATTEMPTS: u32 = 5;

/// Base delay between REST login attempts
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Creates, persists and renews REST sessions
pub struct SessionManager {
    credentials: Arc<dyn CredentialsProvider>,
    store: Arc<dyn DataStore>,
    exchange: Arc<dyn TokenExchange>,
    http: reqwest::Client,
    authorize_http: reqwest::Client,
    endpoints: AuthEndpoints,
    keys: ResolvedKeys,
    login_attempts: u32,
    retry_delay: Duration,
    state: RwLock<SessionState>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("client_id", &self.credentials.client_id())
            .field("endpoints", &self.endpoints)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    credentials: Arc<dyn CredentialsProvider>,
    store: Arc<dyn DataStore>,
    endpoints: AuthEndpoints,
    storage_keys: StorageKeys,
    http_factory: Option<HttpClientFactory>,
    token_exchange: Option<Arc<dyn TokenExchange>>,
    timeout: Option<Duration>,
    login_attempts: u32,
    retry_delay: Duration,
}

impl SessionManagerBuilder {
    /// Override the handshake endpoints
    pub fn endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Override the storage key templates
    pub fn storage_keys(mut self, keys: StorageKeys) -> Self {
        self.storage_keys = keys;
        self
    }

    /// Source of the HTTP clients used for every handshake request
    pub fn http_factory(mut self, factory: HttpClientFactory) -> Self {
        self.http_factory = Some(factory);
        self
    }

    /// Replace the OAuth token exchange
    pub fn token_exchange(mut self, exchange: Arc<dyn TokenExchange>) -> Self {
        self.token_exchange = Some(exchange);
        self
    }

    /// Timeout applied to the handshake's own HTTP clients
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attempts for the REST login step and the base delay between them
    pub fn login_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.login_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn build(self) -> AuthResult<SessionManager> {
        credentials::validate(self.credentials.as_ref())?;

        let factory = self
            .http_factory
            .unwrap_or_else(|| Arc::new(reqwest::Client::builder));
        let timeout = self.timeout;
        let build_client = |builder: reqwest::ClientBuilder| {
            let builder = match timeout {
                Some(timeout) => builder.timeout(timeout),
                None => builder,
            };
            builder
                .build()
                .map_err(|e| AuthError::ConfigError(format!("Failed to build HTTP client: {}", e)))
        };

        // The authorization code only shows up in the redirect itself
        let authorize_http = build_client(factory().redirect(Policy::none()))?;
        let http = build_client(factory())?;

        let exchange = match self.token_exchange {
            Some(exchange) => exchange,
            None => {
                let token_http = build_client(factory().redirect(Policy::none()))?;
                Arc::new(
                    OAuth2TokenExchange::new(self.credentials.as_ref(), &self.endpoints)?
                        .with_http_client(token_http),
                )
            }
        };

        let keys = self.storage_keys.resolve(self.credentials.client_id());

        Ok(SessionManager {
            credentials: self.credentials,
            store: self.store,
            exchange,
            http,
            authorize_http,
            endpoints: self.endpoints,
            keys,
            login_attempts: self.login_attempts,
            retry_delay: self.retry_delay,
            state: RwLock::new(SessionState::Unauthenticated),
        })
    }
}

impl SessionManager {
    /// Create a session manager with the production endpoints
    pub fn new(
        credentials: Arc<dyn CredentialsProvider>,
        store: Arc<dyn DataStore>,
    ) -> AuthResult<Self> {
        Self::builder(credentials, store).build()
    }

    pub fn builder(
        credentials: Arc<dyn CredentialsProvider>,
        store: Arc<dyn DataStore>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder {
            credentials,
            store,
            endpoints: AuthEndpoints::default(),
            storage_keys: StorageKeys::default(),
            http_factory: None,
            token_exchange: None,
            timeout: None,
            login_attempts: DEFAULT_LOGIN_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Client id the session belongs to
    pub fn client_id(&self) -> &str {
        self.credentials.client_id()
    }

    /// Storage keys resolved for this client id
    pub fn storage_keys(&self) -> &ResolvedKeys {
        &self.keys
    }

    /// Lifecycle state as seen by this instance
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Snapshot of everything stored for this client id
    pub async fn session_record(&self) -> AuthResult<SessionRecord> {
        Ok(SessionRecord {
            rest_token: self.store.get(&self.keys.rest_token).await?,
            rest_url: self.store.get(&self.keys.rest_url).await?,
            refresh_token: self.store.get(&self.keys.refresh_token).await?,
        })
    }

    async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    /// Run `step` while in `during`, settling in `Authenticated` on success
    /// and `Unauthenticated` on failure
    async fn transition<F>(&self, during: SessionState, step: F) -> AuthResult<()>
    where
        F: std::future::Future<Output = AuthResult<()>>,
    {
        self.set_state(during).await;
        let result = step.await;
        self.set_state(match result {
            Ok(()) => SessionState::Authenticated,
            Err(_) => SessionState::Unauthenticated,
        })
        .await;
        result
    }

    async fn run_initiate(&self, options: &SessionOptions) -> AuthResult<()> {
        let code = self.fetch_authorization_code().await?;
        let tokens = self.exchange.exchange_code(&code).await?;
        self.create_session(tokens, options).await?;
        info!("REST session initiated for client {}", self.client_id());
        Ok(())
    }

    async fn run_refresh(&self, options: &SessionOptions) -> AuthResult<()> {
        let refresh_token = self
            .store
            .get(&self.keys.refresh_token)
            .await?
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::InvalidRefreshToken("no refresh token stored".into()))?;

        let tokens = self.exchange.exchange_refresh_token(&refresh_token).await?;
        self.create_session(tokens, options).await?;
        info!("REST session refreshed for client {}", self.client_id());
        Ok(())
    }

    /// Submit the login form and extract the authorization code from the redirect
    async fn fetch_authorization_code(&self) -> AuthResult<String> {
        debug!("Requesting authorization code");

        let transport_failure = |e: reqwest::Error| {
            AuthError::AuthFailure(format!(
                "Failed to fetch authorization code (HTTP error: {})",
                e
            ))
        };

        let response = self
            .authorize_http
            .get(&self.endpoints.authorize_url)
            .query(&[
                ("client_id", self.credentials.client_id()),
                ("response_type", "code"),
                ("action", "login"),
                ("username", self.credentials.username()),
                ("password", self.credentials.password()),
            ])
            .send()
            .await
            .map_err(transport_failure)?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(transport_failure)?;

        if body.contains(INVALID_CLIENT_ID_MARKER) {
            return Err(AuthError::InvalidClientId);
        }
        if body.contains(CREDENTIALS_ERROR_MARKER) {
            return Err(AuthError::InvalidUserCredentials);
        }

        location
            .and_then(|location| extract_code(&location, &self.endpoints.authorize_url))
            .ok_or_else(|| AuthError::AuthFailure("Failed to fetch authorization code".into()))
    }

    /// Exchange an access token for a REST session and persist it
    async fn create_session(
        &self,
        tokens: ExchangedTokens,
        options: &SessionOptions,
    ) -> AuthResult<()> {
        let session = self
            .rest_login_with_retries(&tokens.access_token, options)
            .await?;

        if let Some(refresh_token) = &tokens.refresh_token {
            self.store
                .store(&self.keys.refresh_token, refresh_token)
                .await?;
        }
        self.store
            .store(&self.keys.rest_token, &session.rest_token)
            .await?;
        self.store.store(&self.keys.rest_url, &session.rest_url).await?;
        Ok(())
    }

    /// REST login with the access token already minted.
    ///
    /// Transport failures retry this step alone; the code or refresh token
    /// behind `access_token` has been consumed and cannot be presented again.
    async fn rest_login_with_retries(
        &self,
        access_token: &str,
        options: &SessionOptions,
    ) -> AuthResult<RestLoginResponse> {
        let mut attempt = 1;
        loop {
            match self.rest_login(access_token, options).await {
                Err(e) if e.is_transient() && attempt < self.login_attempts => {
                    warn!(
                        "REST login attempt {}/{} failed: {}",
                        attempt, self.login_attempts, e
                    );
                    tokio::time::sleep(backoff_delay(self.retry_delay, attempt)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn rest_login(
        &self,
        access_token: &str,
        options: &SessionOptions,
    ) -> AuthResult<RestLoginResponse> {
        debug!("Performing REST login");

        let response = self
            .http
            .get(&self.endpoints.login_url)
            .query(&options.login_query(access_token))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::RestLoginFailure(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AuthError::CreateSessionFailure {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::RestLoginFailure(e.to_string()))?;
        serde_json::from_str(&body)
            .map_err(|e| AuthError::AuthFailure(format!("Unreadable REST login response: {}", e)))
    }
}

/// Pull the `code` query parameter out of a redirect location
fn extract_code(location: &str, authorize_url: &str) -> Option<String> {
    let url = Url::parse(location).ok().or_else(|| {
        Url::parse(authorize_url)
            .ok()
            .and_then(|base| base.join(location).ok())
    })?;

    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
}

#[async_trait]
impl SessionAuth for SessionManager {
    async fn rest_token(&self) -> AuthResult<Option<String>> {
        self.store.get(&self.keys.rest_token).await
    }

    async fn rest_url(&self) -> AuthResult<Option<String>> {
        self.store.get(&self.keys.rest_url).await
    }

    async fn refresh_token(&self) -> AuthResult<Option<String>> {
        self.store.get(&self.keys.refresh_token).await
    }

    async fn session_is_valid(&self) -> AuthResult<bool> {
        let record = SessionRecord {
            rest_token: self.rest_token().await?,
            rest_url: self.rest_url().await?,
            refresh_token: None,
        };
        Ok(record.is_valid())
    }

    async fn initiate_session(&self, options: &SessionOptions) -> AuthResult<()> {
        self.transition(SessionState::Authenticating, self.run_initiate(options))
            .await
    }

    async fn refresh_session(&self, options: &SessionOptions) -> AuthResult<()> {
        self.transition(SessionState::Refreshing, self.run_refresh(options))
            .await
    }

    fn name(&self) -> &str {
        "SessionManager"
    }
}
