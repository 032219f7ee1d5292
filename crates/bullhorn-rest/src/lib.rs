//! Rust client for the Bullhorn REST API
//!
//! The crate handles Bullhorn's login handshake (authorization code, OAuth2
//! token exchange, REST login), persists the resulting session in a pluggable
//! data store and transparently renews it when the API reports the
//! `BhRestToken` as expired.
//!
//! Most callers only need [`ClientBuilder`] and [`BullhornClient`]; the
//! [`auth`] module exposes the session machinery for custom stores,
//! credentials and session implementations.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod types;

#[cfg(test)]
mod test_support;

pub use auth::HttpClientFactory;
pub use client::{BullhornClient, ClientBuilder, EntityHandle, MAX_ENTITY_REQUEST_COUNT};
pub use config::ClientConfig;
pub use error::{ClientError, ErrorResponse, Result};
pub use gateway::{RequestGateway, RequestParams, REST_TOKEN_HEADER};
pub use types::{
    Entity, EntityChangeResult, EventType, EventsResponse, FetchedEntities, ListResponse,
    SubscriptionEvent, SubscriptionResponse,
};
