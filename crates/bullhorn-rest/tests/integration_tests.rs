//! Integration tests for the Bullhorn REST client

use bullhorn_rest::auth::{
    AuthEndpoints, AuthError, DataStore, LocalFileDataStore, MemoryCredentialsProvider,
    MemoryDataStore,
};
use bullhorn_rest::{BullhornClient, ClientBuilder, ClientConfig, ClientError, Entity, RequestParams};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INVALID_TOKEN_BODY: &str = r#"{"errorMessage":"Bad 'BhRestToken' or timed-out.","errorMessageKey":"errors.authentication.invalidRestToken","errorCode":401}"#;

fn client(server: &MockServer, store: Arc<dyn DataStore>) -> BullhornClient {
    let config = ClientConfig {
        endpoints: AuthEndpoints::with_base(&server.uri()),
        ..ClientConfig::default()
    };
    ClientBuilder::new()
        .config(config)
        .credentials(Arc::new(MemoryCredentialsProvider::new(
            "fake-client-id",
            "fake-client-secret",
            "fake-username",
            "fake-password",
        )))
        .data_store(store)
        .build()
        .unwrap()
}

async fn mount_handshake(server: &MockServer, expected_logins: u64) {
    Mock::given(method("GET"))
        .and(path("/oauth/authorize"))
        .and(query_param("client_id", "fake-client-id"))
        .and(query_param("username", "fake-username"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "https://example.com/cb?code=22%3Aauth-code"),
        )
        .expect(expected_logins)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "token_type": "Bearer",
            "refresh_token": "refresh-1",
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest-services/login"))
        .and(query_param("access_token", "access-1"))
        .and(query_param("version", "2.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "BhRestToken": "rest-token-1",
            "restUrl": format!("{}/rest-services/abc/", server.uri()),
        })))
        .mount(server)
        .await;
}

async fn mount_refresh(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "token_type": "Bearer",
            "refresh_token": "refresh-2",
        })))
        .expect(expected)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest-services/login"))
        .and(query_param("access_token", "access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "BhRestToken": "rest-token-2",
            "restUrl": format!("{}/rest-services/abc/", server.uri()),
        })))
        .mount(server)
        .await;
}

async fn mount_candidate(server: &MockServer, token: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path("/rest-services/abc/entity/Candidate/1"))
        .and(header("BhRestToken", token))
        .respond_with(
            ResponseTemplate::new(status).set_body_raw(body.as_bytes().to_vec(), "application/json"),
        )
        .mount(server)
        .await;
}

#[test_log::test(tokio::test)]
async fn test_cold_start_persists_session_to_file() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_candidate(&server, "rest-token-1", 200, r#"{"data":{"id":1}}"#).await;

    let dir = tempfile::tempdir()?;
    let store_path = dir.path().join("nested").join("store.json");
    let client = client(&server, Arc::new(LocalFileDataStore::new(&store_path)));

    assert!(!client.session_is_valid().await?);
    let candidate = client
        .fetch_entities(&Entity::Candidate, &[1], RequestParams::new())
        .await?;
    assert_eq!(candidate.into_vec()[0]["id"], 1);

    let document: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&store_path)?)?;
    assert_eq!(document["tokens"]["fake-client-id-rest-token"], "rest-token-1");
    assert_eq!(document["tokens"]["fake-client-id-refresh-token"], "refresh-1");
    assert_eq!(
        document["tokens"]["fake-client-id-rest-url"],
        format!("{}/rest-services/abc/", server.uri())
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_session_in_shared_store_is_reused() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_candidate(&server, "rest-token-1", 200, r#"{"data":{"id":1}}"#).await;

    let store = MemoryDataStore::new();
    let first = client(&server, Arc::new(store.clone()));
    let second = client(&server, Arc::new(store));

    first.initiate_session(&Default::default()).await?;
    assert!(second.session_is_valid().await?);

    second
        .fetch_entities(&Entity::Candidate, &[1], RequestParams::new())
        .await?;
    assert_eq!(second.rest_token().await?.as_deref(), Some("rest-token-1"));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_refreshed_session_is_seen_by_other_clients() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_refresh(&server, 1).await;
    mount_candidate(&server, "rest-token-1", 401, INVALID_TOKEN_BODY).await;
    mount_candidate(&server, "rest-token-2", 200, r#"{"data":{"id":1}}"#).await;

    let store = MemoryDataStore::new();
    let first = client(&server, Arc::new(store.clone()));
    let second = client(&server, Arc::new(store));

    first.initiate_session(&Default::default()).await?;
    first
        .fetch_entities(&Entity::Candidate, &[1], RequestParams::new())
        .await?;

    second
        .fetch_entities(&Entity::Candidate, &[1], RequestParams::new())
        .await?;
    assert_eq!(second.rest_token().await?.as_deref(), Some("rest-token-2"));
    assert_eq!(second.refresh_token().await?.as_deref(), Some("refresh-2"));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_explicit_refresh_rotates_tokens() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_refresh(&server, 1).await;

    let client = client(&server, Arc::new(MemoryDataStore::new()));
    client.initiate_session(&Default::default()).await?;
    client.refresh_session(&Default::default()).await?;

    assert_eq!(client.rest_token().await?.as_deref(), Some("rest-token-2"));
    assert_eq!(client.refresh_token().await?.as_deref(), Some("refresh-2"));
    Ok(())
}

#[tokio::test]
async fn test_invalid_client_id_surfaces_from_first_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body><p>Invalid Client Id</p></body></html>",
        ))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryDataStore::new());
    let client = client(&server, store.clone());
    let err = client
        .fetch_entities(&Entity::Candidate, &[1], RequestParams::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Auth(AuthError::InvalidClientId)));
    assert_eq!(store.get("fake-client-id-rest-token").await.unwrap(), None);
}

#[tokio::test]
async fn test_invalid_user_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form><p class="error">Invalid credentials</p></form>"#,
        ))
        .mount(&server)
        .await;

    let client = client(&server, Arc::new(MemoryDataStore::new()));
    let err = client
        .initiate_session(&Default::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Auth(AuthError::InvalidUserCredentials)
    ));
}
