//! Error types for the Bullhorn REST client

use crate::auth::AuthError;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Error message key the REST API uses for a bad or timed-out `BhRestToken`
pub const INVALID_REST_TOKEN_KEY: &str = "errors.authentication.invalidRestToken";

/// Main error type for REST requests
#[derive(Debug, Error)]
pub enum ClientError {
    /// Session handshake or refresh failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The session token was rejected and could not be recovered
    #[error("Invalid or expired REST token")]
    InvalidToken,

    /// Non-success response from the REST API
    #[error("Request failed with status {status}: {body}")]
    Http { status: StatusCode, body: String },

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Invalid request
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Check if error is an authentication failure of any kind
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ClientError::Auth(_) | ClientError::InvalidToken)
    }

    /// HTTP status of the failed response, if there was one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::InvalidToken => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }
}

impl From<figment::Error> for ClientError {
    fn from(error: figment::Error) -> Self {
        ClientError::Config(error.to_string())
    }
}

/// Error body returned by the REST API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_message_key: Option<String>,
    #[serde(default)]
    pub error_code: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Whether this body identifies a bad or expired session token.
    ///
    /// Only the message key is trusted; a bare 401 may come from an IP
    /// allow-list or a permissions check.
    pub fn is_invalid_token(&self) -> bool {
        self.error_message_key.as_deref() == Some(INVALID_REST_TOKEN_KEY)
    }
}

/// Classify a 401 body as a session-token rejection
pub(crate) fn is_invalid_token_body(body: &str) -> bool {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|response| response.is_invalid_token())
        .unwrap_or(false)
}
