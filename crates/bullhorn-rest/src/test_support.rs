//! Shared wiremock fixtures for unit tests

use crate::auth::{AuthEndpoints, DataStore, MemoryCredentialsProvider, SessionManager};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "fake-client-id";
pub const INVALID_TOKEN_BODY: &str = r#"{"errorMessage":"Bad 'BhRestToken' or timed-out.","errorMessageKey":"errors.authentication.invalidRestToken","errorCode":401}"#;

pub fn credentials() -> Arc<MemoryCredentialsProvider> {
    Arc::new(MemoryCredentialsProvider::new(
        CLIENT_ID,
        "fake-client-secret",
        "fake-username",
        "fake-password",
    ))
}

/// REST base URL handed out by the mocked login endpoint
pub fn rest_url(server: &MockServer) -> String {
    format!("{}/rest-services/abc/", server.uri())
}

pub fn manager(server: &MockServer, store: Arc<dyn DataStore>) -> SessionManager {
    SessionManager::builder(credentials(), store)
        .endpoints(AuthEndpoints::with_base(&server.uri()))
        .build()
        .unwrap()
}

pub async fn mount_authorize(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/oauth/authorize"))
        .and(query_param("action", "login"))
        .and(query_param("response_type", "code"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            "https://example.com/callback?code=22%3Afake-auth-code&client_id=fake-client-id",
        ))
        .mount(server)
        .await;
}

pub async fn mount_code_grant(server: &MockServer, access_token: &str, refresh_token: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 600,
            "refresh_token": refresh_token,
        })))
        .mount(server)
        .await;
}

pub async fn mount_refresh_grant(
    server: &MockServer,
    presented: &str,
    access_token: &str,
    refresh_token: &str,
) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains(format!("refresh_token={presented}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 600,
            "refresh_token": refresh_token,
        })))
        .mount(server)
        .await;
}

pub async fn mount_login(server: &MockServer, access_token: &str, rest_token: &str) {
    Mock::given(method("GET"))
        .and(path("/rest-services/login"))
        .and(query_param("access_token", access_token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "BhRestToken": rest_token,
            "restUrl": rest_url(server),
        })))
        .mount(server)
        .await;
}

/// Cold-start handshake yielding `rest-token-1`, and a refresh yielding `rest-token-2`
pub async fn mount_full_handshake(server: &MockServer) {
    mount_authorize(server).await;
    mount_code_grant(server, "access-1", "refresh-1").await;
    mount_refresh_grant(server, "refresh-1", "access-2", "refresh-2").await;
    mount_login(server, "access-1", "rest-token-1").await;
    mount_login(server, "access-2", "rest-token-2").await;
}
