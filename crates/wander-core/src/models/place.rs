//! Place model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::now_millis;

use super::photo::Photo;

/// A client-side identifier for a locally stored entity.
///
/// Freshly created entities get a UUID v7 (time-sortable). Once the server
/// acknowledges the entity the identifier is rewritten to the server id, so the
/// value is an opaque string rather than a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    /// Generate a new unique local identifier using UUID v7
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LocalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LocalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for LocalId {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

/// Sync state of a locally cached entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Matches the last server response
    Synced,
    /// Has local changes not yet acknowledged by the server
    Pending,
    /// Server values were applied while local changes were still queued
    Conflict,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}

/// A WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "lat", alias = "latitude")]
    pub latitude: f64,
    #[serde(rename = "lng", alias = "longitude")]
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a validated coordinate pair
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidInput(format!(
                "Latitude must be within [-90, 90], got {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidInput(format!(
                "Longitude must be within [-180, 180], got {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Fields supplied by the user when adding a place to the bucket list.
///
/// Serializes to the `create` payload sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlace {
    pub name: String,
    #[serde(flatten)]
    pub location: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_date: Option<NaiveDate>,
}

impl NewPlace {
    pub fn new(name: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            name: name.into(),
            location,
            trip_date: None,
        }
    }

    #[must_use]
    pub const fn with_trip_date(mut self, trip_date: NaiveDate) -> Self {
        self.trip_date = Some(trip_date);
        self
    }
}

/// Partial update of a place. Only `Some` fields are changed.
///
/// `trip_date: Some(None)` clears the date and serializes as `"tripDate": null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_date: Option<Option<NaiveDate>>,
}

impl PlacePatch {
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.location.is_none() && self.trip_date.is_none()
    }
}

/// A place on the user's bucket list, as cached on this client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Client-side identifier, stable until reconciliation
    pub local_id: LocalId,
    /// Server-assigned identifier, immutable once set
    pub server_id: Option<String>,
    pub name: String,
    pub location: GeoPoint,
    pub trip_date: Option<NaiveDate>,
    pub sync_status: SyncStatus,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Attached photo references, in display order
    pub photos: Vec<Photo>,
}

impl Place {
    /// Create a pending place from user input
    pub fn new(draft: NewPlace) -> Result<Self> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("Place name cannot be empty".into()));
        }
        let location = GeoPoint::new(draft.location.latitude, draft.location.longitude)?;

        let now = now_millis();
        Ok(Self {
            local_id: LocalId::generate(),
            server_id: None,
            name,
            location,
            trip_date: draft.trip_date,
            sync_status: SyncStatus::Pending,
            created_at: now,
            updated_at: now,
            photos: Vec::new(),
        })
    }

    /// The draft that recreates this place on the server
    pub fn to_new_place(&self) -> NewPlace {
        NewPlace {
            name: self.name.clone(),
            location: self.location,
            trip_date: self.trip_date,
        }
    }

    /// Apply a validated patch locally and mark the place pending
    pub fn apply_patch(&mut self, patch: &PlacePatch) -> Result<()> {
        if let Some(name) = &patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::InvalidInput("Place name cannot be empty".into()));
            }
            self.name = name.to_string();
        }
        if let Some(location) = patch.location {
            self.location = GeoPoint::new(location.latitude, location.longitude)?;
        }
        if let Some(trip_date) = patch.trip_date {
            self.trip_date = trip_date;
        }
        self.updated_at = now_millis().max(self.updated_at);
        self.sync_status = SyncStatus::Pending;
        Ok(())
    }
}
