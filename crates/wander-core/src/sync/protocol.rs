//! Bulk sync wire format.
//!
//! One `POST /sync` carries every queued mutation in insertion order together
//! with the last watermark; the response maps client ids to server ids and
//! returns the canonical state of every place the server touched.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{EntityKind, GeoPoint, MutationAction, MutationQueueItem};
use crate::util::millis_to_datetime;

use super::TransportError;

/// Request body of the bulk sync endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub actions: Vec<SyncAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncRequest {
    /// Translate queue items, preserving their order
    pub fn from_items(items: &[MutationQueueItem], last_synced_at: Option<DateTime<Utc>>) -> Self {
        Self {
            actions: items.iter().map(SyncAction::from).collect(),
            last_synced_at,
        }
    }
}

/// One queued mutation on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAction {
    pub action_type: MutationAction,
    pub entity_type: EntityKind,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl From<&MutationQueueItem> for SyncAction {
    fn from(item: &MutationQueueItem) -> Self {
        let mut payload = item.payload.clone();

        // The parent may have been reconciled after this item was queued
        if let (Some(parent_id), Some(serde_json::Value::Object(fields))) =
            (&item.parent_id, payload.as_mut())
        {
            if fields.contains_key("placeId") {
                fields.insert(
                    "placeId".to_string(),
                    serde_json::Value::String(parent_id.to_string()),
                );
            }
        }

        Self {
            action_type: item.action,
            entity_type: item.entity,
            client_id: item.local_id.to_string(),
            server_id: item.server_id.clone(),
            payload,
            timestamp: millis_to_datetime(item.queued_at),
        }
    }
}

/// Response body of the bulk sync endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default)]
    pub id_mappings: Vec<IdMapping>,
    #[serde(default)]
    pub updated_places: Vec<ServerPlace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResponse {
    /// Validate the response into an applicable batch result
    pub fn into_result(self) -> Result<SyncBatchResult, TransportError> {
        if !self.success {
            return Err(TransportError::Rejected(
                self.error
                    .unwrap_or_else(|| "server reported success: false".to_string()),
            ));
        }
        let synced_at = self.synced_at.ok_or_else(|| {
            TransportError::InvalidResponse("successful response is missing syncedAt".into())
        })?;

        Ok(SyncBatchResult {
            id_mappings: self.id_mappings,
            updated_places: self.updated_places,
            synced_at,
        })
    }
}

/// A validated successful sync response
#[derive(Debug, Clone, PartialEq)]
pub struct SyncBatchResult {
    pub id_mappings: Vec<IdMapping>,
    pub updated_places: Vec<ServerPlace>,
    pub synced_at: DateTime<Utc>,
}

/// Client id to server id assignment for an acknowledged create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMapping {
    pub client_id: String,
    pub server_id: String,
}

impl IdMapping {
    pub fn new(client_id: impl Into<String>, server_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            server_id: server_id.into(),
        }
    }
}

/// Canonical place state returned by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPlace {
    pub id: String,
    pub name: String,
    #[serde(rename = "lat", alias = "latitude")]
    pub latitude: f64,
    #[serde(rename = "lng", alias = "longitude")]
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub photos: Vec<ServerPhoto>,
}

impl ServerPlace {
    pub const fn location(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Canonical photo reference returned by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPhoto {
    pub id: String,
    #[serde(alias = "url")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
