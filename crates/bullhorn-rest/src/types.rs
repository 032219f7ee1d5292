//! Type definitions for the Bullhorn REST API

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bullhorn entity type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entity {
    Appointment,
    Candidate,
    ClientContact,
    ClientCorporation,
    CorporateUser,
    JobOrder,
    JobSubmission,
    Lead,
    Note,
    Opportunity,
    Placement,
    Task,
    /// Any entity without a dedicated variant, by its REST name
    Other(String),
}

impl Entity {
    /// Name used in REST paths
    pub fn as_str(&self) -> &str {
        match self {
            Entity::Appointment => "Appointment",
            Entity::Candidate => "Candidate",
            Entity::ClientContact => "ClientContact",
            Entity::ClientCorporation => "ClientCorporation",
            Entity::CorporateUser => "CorporateUser",
            Entity::JobOrder => "JobOrder",
            Entity::JobSubmission => "JobSubmission",
            Entity::Lead => "Lead",
            Entity::Note => "Note",
            Entity::Opportunity => "Opportunity",
            Entity::Placement => "Placement",
            Entity::Task => "Task",
            Entity::Other(name) => name,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Entity {
    fn from(name: &str) -> Self {
        match name {
            "Appointment" => Entity::Appointment,
            "Candidate" => Entity::Candidate,
            "ClientContact" => Entity::ClientContact,
            "ClientCorporation" => Entity::ClientCorporation,
            "CorporateUser" => Entity::CorporateUser,
            "JobOrder" => Entity::JobOrder,
            "JobSubmission" => Entity::JobSubmission,
            "Lead" => Entity::Lead,
            "Note" => Entity::Note,
            "Opportunity" => Entity::Opportunity,
            "Placement" => Entity::Placement,
            "Task" => Entity::Task,
            other => Entity::Other(other.to_string()),
        }
    }
}

impl FromStr for Entity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Entity::from(s))
    }
}

/// Entity event kinds an event subscription can listen to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Inserted,
    Updated,
    Deleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Inserted => "INSERTED",
            EventType::Updated => "UPDATED",
            EventType::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entities returned by `GET entity/{Entity}/{ids}`.
///
/// The API answers a single id with an object and several ids with a list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FetchedEntities {
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

impl FetchedEntities {
    /// Flatten into a list regardless of the response shape
    pub fn into_vec(self) -> Vec<serde_json::Value> {
        match self {
            FetchedEntities::Many(items) => items,
            FetchedEntities::One(item) => vec![item],
        }
    }
}

/// Envelope of entity fetch responses
#[derive(Debug, Deserialize)]
pub(crate) struct EntityEnvelope {
    pub data: FetchedEntities,
}

/// Paged result of `search/{Entity}` and `query/{Entity}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    /// Total matches; only reported by search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

/// Result of an entity create, update or delete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChangeResult {
    pub changed_entity_type: String,
    pub changed_entity_id: i64,
    /// `INSERT`, `UPDATE` or `DELETE`
    pub change_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Response to an event subscription creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub subscription_id: String,
    #[serde(default)]
    pub created_on: Option<i64>,
    #[serde(default)]
    pub jms_selector: Option<String>,
    #[serde(default)]
    pub last_request_id: Option<i64>,
}

/// Single event delivered by an event subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    pub event_id: String,
    pub event_type: String,
    #[serde(default)]
    pub event_timestamp: Option<i64>,
    pub entity_name: String,
    pub entity_id: i64,
    /// `INSERTED`, `UPDATED` or `DELETED`
    pub entity_event_type: EventType,
    #[serde(default)]
    pub updated_properties: Vec<String>,
}

/// Batch of subscription events; empty when nothing happened
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    #[serde(default)]
    pub request_id: Option<i64>,
    #[serde(default)]
    pub events: Vec<SubscriptionEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_names() {
        assert_eq!(Entity::JobOrder.to_string(), "JobOrder");
        assert_eq!(Entity::from("Candidate"), Entity::Candidate);
        assert_eq!(
            "CustomObject1".parse::<Entity>().unwrap(),
            Entity::Other("CustomObject1".into())
        );
        assert_eq!(Entity::Other("Skill".into()).as_str(), "Skill");
    }

    #[test]
    fn test_fetched_entities_shapes() {
        let one: EntityEnvelope =
            serde_json::from_value(json!({ "data": { "id": 1 } })).unwrap();
        assert_eq!(one.data, FetchedEntities::One(json!({ "id": 1 })));

        let many: EntityEnvelope =
            serde_json::from_value(json!({ "data": [{ "id": 1 }, { "id": 2 }] })).unwrap();
        assert_eq!(many.data.into_vec().len(), 2);
    }

    #[test]
    fn test_events_response_parsing() {
        let response: EventsResponse = serde_json::from_value(json!({
            "requestId": 3,
            "events": [{
                "eventId": "ID:JBM-1",
                "eventType": "ENTITY",
                "eventTimestamp": 1_500_000_000_000_i64,
                "entityName": "Candidate",
                "entityId": 42,
                "entityEventType": "UPDATED",
                "updatedProperties": ["firstName"]
            }]
        }))
        .unwrap();

        assert_eq!(response.request_id, Some(3));
        assert_eq!(response.events[0].entity_event_type, EventType::Updated);
        assert_eq!(response.events[0].updated_properties, vec!["firstName"]);
    }
}
