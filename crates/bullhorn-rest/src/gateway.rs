//! Request dispatch with session recovery
//!
//! The gateway attaches the current `BhRestToken` to every call, resolves
//! relative paths against the session's REST URL and recovers from an
//! expired token: refresh (or re-initiate), then retry the same request
//! exactly once.
//!
//! The underlying HTTP client is bound to one session. Whenever the stored
//! token or URL changes a new client is built instead of mutating the old one.

use crate::auth::types::backoff_delay;
use crate::auth::{AuthError, AuthResult, HttpClientFactory, SessionAuth, SessionOptions};
use crate::config::ClientConfig;
use crate::error::{is_invalid_token_body, ClientError, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

/// Header carrying the session token on every REST call
pub const REST_TOKEN_HEADER: &str = "BhRestToken";

/// Parameters of one REST call
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    /// Query string for GET/PUT/DELETE, form body for POST/PATCH without JSON
    pub query: Vec<(String, String)>,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// JSON request body
    pub json: Option<serde_json::Value>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Whether `query` goes into the URL rather than a form body
    fn encodes_query(&self, method: &Method) -> bool {
        self.json.is_some() || !matches!(*method, Method::POST | Method::PATCH)
    }
}

/// HTTP client bound to one session
#[derive(Debug)]
struct BoundTransport {
    http: reqwest::Client,
    base_url: Url,
    rest_token: String,
    rest_url: String,
}

enum Outcome {
    Success(Response),
    InvalidToken,
    Failed { status: StatusCode, body: String },
}

/// Dispatches REST calls on behalf of the current session
pub struct RequestGateway {
    session: Arc<dyn SessionAuth>,
    config: ClientConfig,
    http_factory: HttpClientFactory,
    transport: RwLock<Option<Arc<BoundTransport>>>,
    recovery: Mutex<()>,
}

impl std::fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateway")
            .field("session", &self.session.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RequestGateway {
    pub fn new(
        session: Arc<dyn SessionAuth>,
        config: ClientConfig,
        http_factory: HttpClientFactory,
    ) -> Self {
        Self {
            session,
            config,
            http_factory,
            transport: RwLock::new(None),
            recovery: Mutex::new(()),
        }
    }

    /// Default transport factory honouring the configured timeout
    pub fn default_http_factory(config: &ClientConfig) -> HttpClientFactory {
        let timeout = config.request_timeout();
        Arc::new(move || reqwest::Client::builder().timeout(timeout))
    }

    pub fn session(&self) -> &Arc<dyn SessionAuth> {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run the full handshake, retrying transient failures
    pub async fn initiate_session(&self, options: &SessionOptions) -> Result<()> {
        let _guard = self.recovery.lock().await;
        self.initiate_locked(options).await
    }

    /// Refresh the session, retrying transient failures
    pub async fn refresh_session(&self, options: &SessionOptions) -> Result<()> {
        let _guard = self.recovery.lock().await;
        self.refresh_locked(options).await
    }

    /// Refresh, falling back to a full handshake when the refresh token is unusable
    pub async fn refresh_or_initiate_session(&self, options: &SessionOptions) -> Result<()> {
        let _guard = self.recovery.lock().await;
        self.refresh_or_initiate_locked(options).await
    }

    // The `*_locked` variants expect the caller to hold `recovery`.

    async fn initiate_locked(&self, options: &SessionOptions) -> Result<()> {
        self.with_session_retries("initiation", || self.session.initiate_session(options))
            .await?;
        self.current_transport().await?;
        Ok(())
    }

    async fn refresh_locked(&self, options: &SessionOptions) -> Result<()> {
        self.with_session_retries("refresh", || self.session.refresh_session(options))
            .await?;
        self.current_transport().await?;
        Ok(())
    }

    async fn refresh_or_initiate_locked(&self, options: &SessionOptions) -> Result<()> {
        match self.refresh_locked(options).await {
            Err(ClientError::Auth(AuthError::InvalidRefreshToken(reason))) => {
                warn!("Session refresh not possible ({}), initiating new session", reason);
                self.initiate_locked(options).await
            }
            other => other,
        }
    }

    /// Execute a REST call, recovering once from an expired session token
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: RequestParams,
    ) -> Result<Response> {
        self.ensure_session().await?;

        let transport = self.current_transport().await?;
        match self.attempt(&transport, &method, path, &params).await? {
            Outcome::Success(response) => return Ok(response),
            Outcome::Failed { status, body } => return Err(ClientError::Http { status, body }),
            Outcome::InvalidToken if !self.config.auto_refresh_sessions => {
                return Err(ClientError::InvalidToken)
            }
            Outcome::InvalidToken => {}
        }

        self.recover(&transport.rest_token).await?;

        // Re-read the session; the retry must not reuse the rejected token
        let transport = self.current_transport().await?;
        match self.attempt(&transport, &method, path, &params).await? {
            Outcome::Success(response) => Ok(response),
            Outcome::InvalidToken => Err(ClientError::InvalidToken),
            Outcome::Failed { status, body } => Err(ClientError::Http { status, body }),
        }
    }

    /// Start a session on first use unless the store already holds one
    async fn ensure_session(&self) -> Result<()> {
        if self.session.session_is_valid().await? {
            return Ok(());
        }

        let _guard = self.recovery.lock().await;
        if !self.session.session_is_valid().await? {
            info!("No REST session available, initiating one");
            self.initiate_locked(&self.config.session).await?;
        }
        Ok(())
    }

    /// Renew the session after `stale_token` was rejected.
    ///
    /// Recoveries are serialized; if another request already replaced the
    /// stale token there is nothing left to do.
    async fn recover(&self, stale_token: &str) -> Result<()> {
        let _guard = self.recovery.lock().await;

        let current = self.session.rest_token().await?;
        if current
            .as_deref()
            .is_some_and(|token| !token.is_empty() && token != stale_token)
        {
            debug!("Session already renewed by a concurrent request");
            return Ok(());
        }

        info!("REST token rejected, renewing session");
        self.refresh_or_initiate_locked(&self.config.session).await
    }

    /// Re-run a handshake step after transport failures that consumed nothing,
    /// backing off between attempts
    async fn with_session_retries<F, Fut>(&self, operation: &str, mut step: F) -> AuthResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AuthResult<()>>,
    {
        let attempts = self.config.session_attempts();
        let mut attempt = 1;
        loop {
            match step().await {
                Ok(()) => return Ok(()),
                Err(e) if e.restarts_handshake() && attempt < attempts => {
                    warn!(
                        "Session {} attempt {}/{} failed: {}",
                        operation, attempt, attempts, e
                    );
                    tokio::time::sleep(backoff_delay(self.config.retry_delay(), attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Transport for the stored session, rebuilt when the session changed
    async fn current_transport(&self) -> Result<Arc<BoundTransport>> {
        let rest_token = self.session.rest_token().await?.filter(|t| !t.is_empty());
        let rest_url = self.session.rest_url().await?.filter(|u| !u.is_empty());
        let (Some(rest_token), Some(rest_url)) = (rest_token, rest_url) else {
            return Err(AuthError::AuthFailure("No REST session available".into()).into());
        };

        if let Some(transport) = self.transport.read().await.as_ref() {
            if transport.rest_token == rest_token && transport.rest_url == rest_url {
                return Ok(transport.clone());
            }
        }

        let transport = Arc::new(self.bind(rest_token, rest_url)?);
        debug!("Bound transport to {}", transport.base_url);
        *self.transport.write().await = Some(transport.clone());
        Ok(transport)
    }

    fn bind(&self, rest_token: String, rest_url: String) -> Result<BoundTransport> {
        let token_value =
            HeaderValue::from_str(&rest_token).map_err(|_| ClientError::InvalidRequest {
                message: "REST token is not a valid header value".into(),
            })?;
        let mut headers = HeaderMap::new();
        headers.insert(REST_TOKEN_HEADER, token_value);

        let http = (self.http_factory)().default_headers(headers).build()?;
        let base_url = parse_base_url(&rest_url)?;

        Ok(BoundTransport {
            http,
            base_url,
            rest_token,
            rest_url,
        })
    }

    async fn attempt(
        &self,
        transport: &BoundTransport,
        method: &Method,
        path: &str,
        params: &RequestParams,
    ) -> Result<Outcome> {
        let url = resolve(&transport.base_url, path)?;
        debug!("{} {}", method, url.path());

        let mut request = transport.http.request(method.clone(), url);
        if params.encodes_query(method) {
            if !params.query.is_empty() {
                request = request.query(&params.query);
            }
        } else {
            request = request.form(&params.query);
        }
        for (key, value) in &params.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &params.json {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(Outcome::Success(response));
        }

        let body = response.text().await?;
        if status == StatusCode::UNAUTHORIZED && is_invalid_token_body(&body) {
            debug!("REST token rejected by {}", transport.base_url);
            return Ok(Outcome::InvalidToken);
        }
        Ok(Outcome::Failed { status, body })
    }
}

/// REST URLs are directories; keep the trailing slash so joins stay inside them
fn parse_base_url(rest_url: &str) -> Result<Url> {
    let normalized = if rest_url.ends_with('/') {
        rest_url.to_string()
    } else {
        format!("{rest_url}/")
    };
    Url::parse(&normalized).map_err(|e| ClientError::InvalidRequest {
        message: format!("Invalid REST URL {}: {}", rest_url, e),
    })
}

fn resolve(base: &Url, path: &str) -> Result<Url> {
    let joined = if path.starts_with("http://") || path.starts_with("https://") {
        Url::parse(path)
    } else {
        base.join(path.trim_start_matches('/'))
    };
    joined.map_err(|e| ClientError::InvalidRequest {
        message: format!("Invalid request path {}: {}", path, e),
    })
}
