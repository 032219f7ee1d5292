//! OAuth 2.0 token exchange
//!
//! Wraps the `oauth2` crate for the two grants the handshake needs: the
//! authorization-code grant during a cold start and the refresh-token grant
//! during renewal. Provider errors are translated into the handshake's
//! [`AuthError`] taxonomy here, so the session manager never sees raw OAuth
//! error codes.

use super::credentials::CredentialsProvider;
use super::types::{AuthEndpoints, AuthError, AuthResult};
use async_trait::async_trait;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, HttpRequest, HttpResponse,
    RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
};
use std::fmt;
use tracing::debug;

/// Access token minted by the token endpoint, plus the rotating refresh token
#[derive(Clone)]
pub struct ExchangedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl fmt::Debug for ExchangedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangedTokens")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Token endpoint grants used by the handshake
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Authorization-code grant.
    ///
    /// `invalid_client` maps to [`AuthError::InvalidClientSecret`],
    /// `invalid_grant` to [`AuthError::InvalidAuthCode`], other provider
    /// errors to [`AuthError::AuthFailure`].
    async fn exchange_code(&self, code: &str) -> AuthResult<ExchangedTokens>;

    /// Refresh-token grant. Any provider error maps to
    /// [`AuthError::InvalidRefreshToken`]; the token is single-use.
    async fn exchange_refresh_token(&self, refresh_token: &str) -> AuthResult<ExchangedTokens>;
}

/// [`TokenExchange`] backed by the `oauth2` crate
pub struct OAuth2TokenExchange {
    client: BasicClient,
    http: reqwest::Client,
}

impl OAuth2TokenExchange {
    pub fn new(
        credentials: &dyn CredentialsProvider,
        endpoints: &AuthEndpoints,
    ) -> AuthResult<Self> {
        let client = BasicClient::new(
            ClientId::new(credentials.client_id().to_string()),
            Some(ClientSecret::new(credentials.client_secret().to_string())),
            AuthUrl::new(endpoints.authorize_url.clone())
                .map_err(|e| AuthError::ConfigError(format!("Invalid auth endpoint: {}", e)))?,
            Some(
                TokenUrl::new(endpoints.token_url.clone()).map_err(|e| {
                    AuthError::ConfigError(format!("Invalid token endpoint: {}", e))
                })?,
            ),
        )
        // Client credentials travel in the form body, not in a Basic header
        .set_auth_type(AuthType::RequestBody);

        // Token endpoints must not redirect
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, http })
    }

    /// Send token requests through `http` instead of a default client
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

/// Bridge between `oauth2`'s transport-agnostic requests and a shared reqwest client
async fn send(
    http: &reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

type ExchangeError = RequestTokenError<reqwest::Error, BasicErrorResponse>;

fn describe(response: &BasicErrorResponse) -> String {
    match response.error_description() {
        Some(description) => format!("{}: {}", response.error(), description),
        None => response.error().to_string(),
    }
}

fn map_code_error(error: ExchangeError) -> AuthError {
    match error {
        RequestTokenError::ServerResponse(response) => match response.error() {
            BasicErrorResponseType::InvalidClient => AuthError::InvalidClientSecret,
            BasicErrorResponseType::InvalidGrant => AuthError::InvalidAuthCode,
            _ => AuthError::AuthFailure(format!(
                "Failed to fetch access token: {}",
                describe(&response)
            )),
        },
        RequestTokenError::Request(e) => {
            AuthError::NetworkError(format!("Token exchange failed: {}", e))
        }
        RequestTokenError::Parse(e, _) => {
            AuthError::AuthFailure(format!("Failed to parse token response: {}", e))
        }
        RequestTokenError::Other(message) => {
            AuthError::AuthFailure(format!("Failed to fetch access token: {}", message))
        }
    }
}

fn map_refresh_error(error: ExchangeError) -> AuthError {
    match error {
        RequestTokenError::ServerResponse(response) => AuthError::InvalidRefreshToken(format!(
            "refresh token rejected: {}",
            describe(&response)
        )),
        RequestTokenError::Request(e) => {
            AuthError::NetworkError(format!("Token refresh request failed: {}", e))
        }
        RequestTokenError::Parse(e, _) => {
            AuthError::InvalidRefreshToken(format!("unreadable refresh response: {}", e))
        }
        RequestTokenError::Other(message) => AuthError::InvalidRefreshToken(message),
    }
}

fn into_tokens<T: TokenResponse<oauth2::basic::BasicTokenType>>(response: T) -> ExchangedTokens {
    ExchangedTokens {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response
            .refresh_token()
            .map(|token| token.secret().to_string()),
    }
}

#[async_trait]
impl TokenExchange for OAuth2TokenExchange {
    async fn exchange_code(&self, code: &str) -> AuthResult<ExchangedTokens> {
        debug!("Exchanging authorization code for tokens");

        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(|request| send(&self.http, request))
            .await
            .map_err(map_code_error)?;

        Ok(into_tokens(response))
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> AuthResult<ExchangedTokens> {
        debug!("Exchanging refresh token for new tokens");

        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let response = self
            .client
            .exchange_refresh_token(&refresh_token)
            .request_async(|request| send(&self.http, request))
            .await
            .map_err(map_refresh_error)?;

        Ok(into_tokens(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::MemoryCredentialsProvider;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn exchange_for(server: &MockServer) -> OAuth2TokenExchange {
        let credentials = MemoryCredentialsProvider::new("client", "secret", "user", "pass");
        OAuth2TokenExchange::new(&credentials, &AuthEndpoints::with_base(&server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_code_exchange_sends_credentials_in_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("client_secret=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access",
                "token_type": "Bearer",
                "expires_in": 600,
                "refresh_token": "refresh",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = exchange_for(&server).await.exchange_code("the-code").await.unwrap();
        assert_eq!(tokens.access_token, "access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_code_exchange_error_mapping() {
        let cases = [
            ("invalid_client", "client"),
            ("invalid_grant", "grant"),
            ("server_error", "other"),
        ];

        for (code, kind) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/oauth/token"))
                .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": code })))
                .mount(&server)
                .await;

            let err = exchange_for(&server)
                .await
                .exchange_code("bad")
                .await
                .unwrap_err();
            match kind {
                "client" => assert!(matches!(err, AuthError::InvalidClientSecret)),
                "grant" => assert!(matches!(err, AuthError::InvalidAuthCode)),
                _ => assert!(matches!(err, AuthError::AuthFailure(_))),
            }
        }
    }

    #[tokio::test]
    async fn test_exchange_uses_injected_http_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(header("x-proxy-tag", "bullhorn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access",
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-proxy-tag", "bullhorn".parse().unwrap());
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .unwrap();

        let tokens = exchange_for(&server)
            .await
            .with_http_client(http)
            .exchange_code("the-code")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "access");
        assert_eq!(tokens.refresh_token, None);
    }

    #[tokio::test]
    async fn test_refresh_provider_error_is_invalid_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "mock error" })))
            .mount(&server)
            .await;

        let err = exchange_for(&server)
            .await
            .exchange_refresh_token("stale")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken(_)));
    }
}
