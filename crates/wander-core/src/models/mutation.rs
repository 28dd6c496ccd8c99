//! Mutation queue item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::util::now_millis;

use super::photo::Photo;
use super::place::{LocalId, Place, PlacePatch};

/// Kind of change recorded in the mutation queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl MutationAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("Unknown mutation action: {other}"))),
        }
    }
}

/// Entity type targeted by a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Place,
    Photo,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::Photo => "photo",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "place" => Ok(Self::Place),
            "photo" => Ok(Self::Photo),
            other => Err(Error::InvalidInput(format!("Unknown entity kind: {other}"))),
        }
    }
}

/// A mutation that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMutation {
    pub action: MutationAction,
    pub entity: EntityKind,
    pub local_id: LocalId,
    /// Owning entity for child records (a photo's place)
    pub parent_id: Option<LocalId>,
    pub server_id: Option<String>,
    pub payload: Option<serde_json::Value>,
    /// Wall-clock time of the local change (Unix ms)
    pub queued_at: i64,
}

impl NewMutation {
    pub fn create_place(place: &Place) -> Result<Self> {
        Ok(Self {
            action: MutationAction::Create,
            entity: EntityKind::Place,
            local_id: place.local_id.clone(),
            parent_id: None,
            server_id: place.server_id.clone(),
            payload: Some(serde_json::to_value(place.to_new_place())?),
            queued_at: now_millis(),
        })
    }

    pub fn update_place(place: &Place, patch: &PlacePatch) -> Result<Self> {
        Ok(Self {
            action: MutationAction::Update,
            entity: EntityKind::Place,
            local_id: place.local_id.clone(),
            parent_id: None,
            server_id: place.server_id.clone(),
            payload: Some(serde_json::to_value(patch)?),
            queued_at: now_millis(),
        })
    }

    pub fn delete_place(place: &Place) -> Self {
        Self {
            action: MutationAction::Delete,
            entity: EntityKind::Place,
            local_id: place.local_id.clone(),
            parent_id: None,
            server_id: place.server_id.clone(),
            payload: None,
            queued_at: now_millis(),
        }
    }

    pub fn create_photo(photo: &Photo) -> Result<Self> {
        Ok(Self {
            action: MutationAction::Create,
            entity: EntityKind::Photo,
            local_id: photo.local_id.clone(),
            parent_id: Some(photo.place_id.clone()),
            server_id: photo.server_id.clone(),
            payload: Some(serde_json::to_value(photo.to_payload())?),
            queued_at: now_millis(),
        })
    }

    pub fn delete_photo(photo: &Photo) -> Self {
        Self {
            action: MutationAction::Delete,
            entity: EntityKind::Photo,
            local_id: photo.local_id.clone(),
            parent_id: Some(photo.place_id.clone()),
            server_id: photo.server_id.clone(),
            payload: None,
            queued_at: now_millis(),
        }
    }
}

/// A durably queued mutation awaiting server acknowledgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationQueueItem {
    /// Monotonic sequence number; defines replay order
    pub seq: i64,
    pub action: MutationAction,
    pub entity: EntityKind,
    pub local_id: LocalId,
    pub parent_id: Option<LocalId>,
    pub server_id: Option<String>,
    pub payload: Option<serde_json::Value>,
    /// Wall-clock time of the local change (Unix ms)
    pub queued_at: i64,
    /// Number of failed sync attempts that carried this item
    pub retry_count: u32,
}
