//! HTTP client for the Bullhorn REST API
//!
//! This module provides a type-safe client over the Bullhorn entity, search,
//! query, meta and event subscription endpoints.
//!
//! # Sessions
//!
//! The client starts a session lazily on the first request and reuses any
//! session already present in its data store, so several processes sharing
//! one store share one session. When the API rejects the `BhRestToken` the
//! session is refreshed and the request retried once.
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use bullhorn_rest::{ClientBuilder, Entity};
//! use bullhorn_rest::auth::{MemoryCredentialsProvider, MemoryDataStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> bullhorn_rest::Result<()> {
//! let client = ClientBuilder::new()
//!     .credentials(Arc::new(MemoryCredentialsProvider::new(
//!         "client-id",
//!         "client-secret",
//!         "username",
//!         "password",
//!     )))
//!     .data_store(Arc::new(MemoryDataStore::new()))
//!     .build()?;
//!
//! let _candidates = client
//!     .entity(Entity::Candidate)
//!     .search("isDeleted:0", Default::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::auth::{
    CredentialsProvider, DataStore, EnvironmentCredentialsProvider, HttpClientFactory,
    LocalFileDataStore, SessionAuth, SessionManager, SessionOptions, TokenExchange,
};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::gateway::{RequestGateway, RequestParams};
use crate::types::{
    Entity, EntityChangeResult, EntityEnvelope, EventType, EventsResponse, FetchedEntities,
    ListResponse, SubscriptionResponse,
};
use futures::future::try_join_all;
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Largest number of ids fetched by one bulk search request
pub const MAX_ENTITY_REQUEST_COUNT: usize = 500;

/// Client for interacting with the Bullhorn REST API
#[derive(Debug, Clone)]
pub struct BullhornClient {
    gateway: Arc<RequestGateway>,
}

impl BullhornClient {
    /// Builder with default configuration
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Underlying request gateway
    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    /// Handle bound to one entity type
    pub fn entity(&self, entity: impl Into<Entity>) -> EntityHandle<'_> {
        EntityHandle {
            client: self,
            entity: entity.into(),
        }
    }

    // ===== Session =====

    /// Start a new session now instead of on the first request
    pub async fn initiate_session(&self, options: &SessionOptions) -> Result<()> {
        self.gateway.initiate_session(options).await
    }

    /// Renew the session, falling back to a new one if the refresh token is unusable
    pub async fn refresh_session(&self, options: &SessionOptions) -> Result<()> {
        self.gateway.refresh_or_initiate_session(options).await
    }

    pub async fn session_is_valid(&self) -> Result<bool> {
        Ok(self.gateway.session().session_is_valid().await?)
    }

    pub async fn rest_token(&self) -> Result<Option<String>> {
        Ok(self.gateway.session().rest_token().await?)
    }

    pub async fn rest_url(&self) -> Result<Option<String>> {
        Ok(self.gateway.session().rest_url().await?)
    }

    pub async fn refresh_token(&self) -> Result<Option<String>> {
        Ok(self.gateway.session().refresh_token().await?)
    }

    // ===== Raw requests =====

    /// Send any REST call relative to the session's REST URL
    pub async fn raw_request(
        &self,
        method: Method,
        path: &str,
        params: RequestParams,
    ) -> Result<Response> {
        self.gateway.request(method, path, params).await
    }

    // ===== Entities =====

    /// Fetch entities by id
    pub async fn fetch_entities(
        &self,
        entity: &Entity,
        ids: &[i64],
        params: RequestParams,
    ) -> Result<FetchedEntities> {
        if ids.is_empty() {
            return Err(ClientError::InvalidRequest {
                message: format!("Cannot fetch {entity} without specifying an id"),
            });
        }
        let path = format!("entity/{}/{}", entity, join(ids));
        let envelope: EntityEnvelope = self.get_json(Method::GET, &path, params).await?;
        Ok(envelope.data)
    }

    /// Lucene search over an entity
    pub async fn search_entities(
        &self,
        entity: &Entity,
        query: &str,
        params: RequestParams,
    ) -> Result<ListResponse> {
        let params = with_default_fields(params).param("query", query);
        let path = format!("search/{entity}");
        self.get_json(Method::GET, &path, params).await
    }

    /// JPQL-style `where` query over an entity
    pub async fn query_entities(
        &self,
        entity: &Entity,
        where_clause: &str,
        params: RequestParams,
    ) -> Result<ListResponse> {
        let params = with_default_fields(params).param("where", where_clause);
        let path = format!("query/{entity}");
        self.get_json(Method::GET, &path, params).await
    }

    /// Fetch many entities by id.
    ///
    /// Ids are split into chunks searched concurrently; results keep chunk order.
    pub async fn fetch_entities_bulk(
        &self,
        entity: &Entity,
        ids: &[i64],
        fields: &[&str],
    ) -> Result<Vec<serde_json::Value>> {
        let fields = if fields.is_empty() {
            "*".to_string()
        } else {
            fields.join(",")
        };

        let requests = ids.chunks(MAX_ENTITY_REQUEST_COUNT).map(|chunk| {
            let query = chunk
                .iter()
                .map(|id| format!("id:{id}"))
                .collect::<Vec<_>>()
                .join(" OR ");
            let params = RequestParams::new()
                .param("count", MAX_ENTITY_REQUEST_COUNT)
                .param("fields", &fields);
            async move { self.search_entities(entity, &query, params).await }
        });

        debug!(
            "Fetching {} {} entities in {} requests",
            ids.len(),
            entity,
            ids.len().div_ceil(MAX_ENTITY_REQUEST_COUNT)
        );
        let pages = try_join_all(requests).await?;
        Ok(pages.into_iter().flat_map(|page| page.data).collect())
    }

    /// Entity metadata; `depth` is `full` or `basic`
    pub async fn meta(
        &self,
        entity: &Entity,
        fields: &[&str],
        depth: &str,
    ) -> Result<serde_json::Value> {
        let fields = if fields.is_empty() {
            "*".to_string()
        } else {
            fields.join(",")
        };
        let params = RequestParams::new()
            .param("fields", fields)
            .param("meta", depth);
        self.get_json(Method::GET, &format!("meta/{entity}"), params)
            .await
    }

    pub async fn create_entity(
        &self,
        entity: &Entity,
        attributes: serde_json::Value,
    ) -> Result<EntityChangeResult> {
        let params = RequestParams::new().json(attributes);
        self.get_json(Method::PUT, &format!("entity/{entity}"), params)
            .await
    }

    pub async fn update_entity(
        &self,
        entity: &Entity,
        id: i64,
        attributes: serde_json::Value,
    ) -> Result<EntityChangeResult> {
        let params = RequestParams::new().json(attributes);
        self.get_json(Method::POST, &format!("entity/{entity}/{id}"), params)
            .await
    }

    pub async fn delete_entity(&self, entity: &Entity, id: i64) -> Result<EntityChangeResult> {
        self.get_json(
            Method::DELETE,
            &format!("entity/{entity}/{id}"),
            RequestParams::new(),
        )
        .await
    }

    /// Update several entities at once; `attributes` must carry `ids`
    pub async fn mass_update(
        &self,
        entity: &Entity,
        attributes: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if attributes.get("ids").is_none() {
            return Err(ClientError::InvalidRequest {
                message: format!("Cannot mass update {entity} without an `ids` attribute"),
            });
        }
        let params = RequestParams::new().json(attributes);
        self.get_json(Method::POST, &format!("massUpdate/{entity}"), params)
            .await
    }

    /// Properties of an entity that support mass update
    pub async fn mass_update_properties(&self, entity: &Entity) -> Result<serde_json::Value> {
        self.get_json(
            Method::GET,
            &format!("massUpdate/{entity}"),
            RequestParams::new(),
        )
        .await
    }

    // ===== Event subscriptions =====

    pub async fn create_event_subscription(
        &self,
        name: &str,
        entities: &[Entity],
        event_types: &[EventType],
    ) -> Result<SubscriptionResponse> {
        let params = RequestParams::new()
            .param("type", "entity")
            .param("names", join(entities))
            .param("eventTypes", join(event_types));
        self.get_json(Method::PUT, &format!("event/subscription/{name}"), params)
            .await
    }

    /// Pull up to `max_events` pending events
    pub async fn fetch_event_subscription_events(
        &self,
        name: &str,
        max_events: u32,
    ) -> Result<EventsResponse> {
        let params = RequestParams::new().param("maxEvents", max_events);
        let response = self
            .raw_request(Method::GET, &format!("event/subscription/{name}"), params)
            .await?;

        // No pending events comes back as an empty body
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(EventsResponse::default());
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn delete_event_subscription(&self, name: &str) -> Result<()> {
        self.raw_request(
            Method::DELETE,
            &format!("event/subscription/{name}"),
            RequestParams::new(),
        )
        .await?;
        Ok(())
    }

    // ===== Private Helper Methods =====

    async fn get_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: RequestParams,
    ) -> Result<T> {
        let response = self.raw_request(method, path, params).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Search and query return only ids unless asked for more
fn with_default_fields(params: RequestParams) -> RequestParams {
    if params.query.iter().any(|(key, _)| key == "fields") {
        params
    } else {
        params.param("fields", "id")
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Operations bound to one entity type
#[derive(Debug, Clone)]
pub struct EntityHandle<'a> {
    client: &'a BullhornClient,
    entity: Entity,
}

impl EntityHandle<'_> {
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub async fn fetch(&self, ids: &[i64], params: RequestParams) -> Result<FetchedEntities> {
        self.client.fetch_entities(&self.entity, ids, params).await
    }

    pub async fn fetch_bulk(&self, ids: &[i64], fields: &[&str]) -> Result<Vec<serde_json::Value>> {
        self.client
            .fetch_entities_bulk(&self.entity, ids, fields)
            .await
    }

    pub async fn search(&self, query: &str, params: RequestParams) -> Result<ListResponse> {
        self.client.search_entities(&self.entity, query, params).await
    }

    pub async fn query(&self, where_clause: &str, params: RequestParams) -> Result<ListResponse> {
        self.client
            .query_entities(&self.entity, where_clause, params)
            .await
    }

    pub async fn meta(&self, fields: &[&str], depth: &str) -> Result<serde_json::Value> {
        self.client.meta(&self.entity, fields, depth).await
    }

    pub async fn create(&self, attributes: serde_json::Value) -> Result<EntityChangeResult> {
        self.client.create_entity(&self.entity, attributes).await
    }

    pub async fn update(
        &self,
        id: i64,
        attributes: serde_json::Value,
    ) -> Result<EntityChangeResult> {
        self.client.update_entity(&self.entity, id, attributes).await
    }

    pub async fn delete(&self, id: i64) -> Result<EntityChangeResult> {
        self.client.delete_entity(&self.entity, id).await
    }

    pub async fn mass_update(&self, attributes: serde_json::Value) -> Result<serde_json::Value> {
        self.client.mass_update(&self.entity, attributes).await
    }
}

/// Builder for constructing a BullhornClient with custom configuration
#[derive(Default)]
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    data_store: Option<Arc<dyn DataStore>>,
    session: Option<Arc<dyn SessionAuth>>,
    token_exchange: Option<Arc<dyn TokenExchange>>,
    http_client_factory: Option<HttpClientFactory>,
}

impl ClientBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given configuration instead of the defaults
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Credentials for the login handshake; read from the environment when unset
    pub fn credentials(mut self, credentials: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Store for session values; a local JSON file when unset
    pub fn data_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.data_store = Some(store);
        self
    }

    /// Replace the session manager entirely
    pub fn session(mut self, session: Arc<dyn SessionAuth>) -> Self {
        self.session = Some(session);
        self
    }

    /// Replace the OAuth token exchange of the built-in session manager
    pub fn token_exchange(mut self, exchange: Arc<dyn TokenExchange>) -> Self {
        self.token_exchange = Some(exchange);
        self
    }

    /// Produce the HTTP clients used for REST calls and every handshake request
    pub fn http_client_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> reqwest::ClientBuilder + Send + Sync + 'static,
    {
        self.http_client_factory = Some(Arc::new(factory));
        self
    }

    /// Build the client
    pub fn build(self) -> Result<BullhornClient> {
        let config = self.config.unwrap_or_default();
        let http_factory = self
            .http_client_factory
            .unwrap_or_else(|| RequestGateway::default_http_factory(&config));

        let session: Arc<dyn SessionAuth> = match self.session {
            Some(session) => {
                if self.credentials.is_some()
                    || self.data_store.is_some()
                    || self.token_exchange.is_some()
                {
                    return Err(ClientError::Config(
                        "A custom session already owns its credentials, data store and token exchange"
                            .into(),
                    ));
                }
                session
            }
            None => {
                let credentials = match self.credentials {
                    Some(credentials) => credentials,
                    None => Arc::new(EnvironmentCredentialsProvider::from_env()?),
                };
                let store = self
                    .data_store
                    .unwrap_or_else(|| Arc::new(LocalFileDataStore::default()));

                let mut builder = SessionManager::builder(credentials, store)
                    .endpoints(config.endpoints.clone())
                    .storage_keys(config.storage_keys.clone())
                    .timeout(config.request_timeout())
                    .http_factory(http_factory.clone())
                    .login_retries(config.session_attempts(), config.retry_delay());
                if let Some(exchange) = self.token_exchange {
                    builder = builder.token_exchange(exchange);
                }
                Arc::new(builder.build()?)
            }
        };

        Ok(BullhornClient {
            gateway: Arc::new(RequestGateway::new(session, config, http_factory)),
        })
    }
}
