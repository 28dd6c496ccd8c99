//! User-facing place mutations.
//!
//! Every offline mutation is an optimistic write plus a queued mutation in
//! the same transaction, so neither can succeed alone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{MutationQueue, PlaceRepository, SqliteMutationQueue, SqlitePlaceRepository};
use crate::models::{LocalId, NewMutation, NewPlace, Photo, Place, PlacePatch};
use crate::state::{SyncPhase, SyncSession};
use crate::sync::{
    merge_server_places, BackgroundSyncRegistrar, ConnectivityMonitor, HttpSyncClient,
    NoopRegistrar, SyncApi, TransportError,
};
use crate::{Error, Result};

use super::store::LocalStore;

/// Outcome of pulling the full listing from the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Places overwritten while local edits are still queued
    pub conflicts: usize,
}

/// What `wander status` shows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub place_count: usize,
    pub pending_count: usize,
    pub max_retry_count: u32,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub is_online: bool,
    pub phase: SyncPhase,
}

impl StatusReport {
    /// Overlay the live orchestrator session
    pub fn with_session(mut self, session: &SyncSession) -> Self {
        self.phase = session.phase;
        self.is_online = session.is_online;
        if session.last_error.is_some() {
            self.last_error.clone_from(&session.last_error);
        }
        self
    }
}

/// Place and photo operations over the local store and the remote API
pub struct PlaceService<A = HttpSyncClient> {
    store: LocalStore,
    api: Option<Arc<A>>,
    connectivity: Option<ConnectivityMonitor>,
    registrar: Arc<dyn BackgroundSyncRegistrar>,
}

impl PlaceService {
    /// Service with no remote API; every mutation is queued
    pub fn offline(store: LocalStore) -> Self {
        Self {
            store,
            api: None,
            connectivity: None,
            registrar: Arc::new(NoopRegistrar),
        }
    }
}

impl<A: SyncApi> PlaceService<A> {
    pub fn new(store: LocalStore, api: Arc<A>) -> Self {
        Self {
            store,
            api: Some(api),
            connectivity: None,
            registrar: Arc::new(NoopRegistrar),
        }
    }

    #[must_use]
    pub fn with_connectivity(mut self, monitor: ConnectivityMonitor) -> Self {
        self.connectivity = Some(monitor);
        self
    }

    #[must_use]
    pub fn with_registrar(mut self, registrar: Arc<dyn BackgroundSyncRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// An API is configured and the monitor (if any) reports online
    pub fn is_online(&self) -> bool {
        if self.api.is_none() {
            return false;
        }
        self.connectivity
            .as_ref()
            .map_or(true, ConnectivityMonitor::is_online)
    }

    /// Create a place, online-first.
    ///
    /// When the API accepts the place it is stored as `synced` under its
    /// server id. Any transport failure falls back to the offline path.
    pub async fn create_place(&self, draft: NewPlace) -> Result<Place> {
        let place = Place::new(draft)?;

        if let Some(api) = self.api.as_ref().filter(|_| self.is_online()) {
            match api.create_place(place.to_new_place()).await {
                Ok(created) => {
                    let stored = self
                        .store
                        .write(move |conn| {
                            let places = SqlitePlaceRepository::new(conn);
                            places.merge_from_server(std::slice::from_ref(&created))?;
                            places
                                .find_by_server_id(&created.id)?
                                .ok_or_else(|| Error::NotFound(created.id.clone()))
                        })
                        .await?;
                    tracing::info!(id = %stored.local_id, "Created place on server");
                    return Ok(stored);
                }
                Err(error) => {
                    tracing::warn!(%error, "Online create failed; queueing for sync");
                }
            }
        }

        let place = self
            .store
            .write(move |conn| {
                SqlitePlaceRepository::new(conn).save(&place)?;
                let mutation = NewMutation::create_place(&place)?;
                SqliteMutationQueue::new(conn).enqueue(&mutation)?;
                Ok(place)
            })
            .await?;
        tracing::debug!(id = %place.local_id, "Queued place create");
        self.request_background_sync("place created");
        Ok(place)
    }

    pub async fn update_place(&self, id: &LocalId, patch: PlacePatch) -> Result<Place> {
        if patch.is_empty() {
            return Err(Error::InvalidInput("Nothing to update".into()));
        }

        let id = id.clone();
        let place = self
            .store
            .write(move |conn| {
                let mut place = require_place(conn, &id)?;
                place.apply_patch(&patch)?;
                SqlitePlaceRepository::new(conn).save(&place)?;
                let mutation = NewMutation::update_place(&place, &patch)?;
                SqliteMutationQueue::new(conn).enqueue(&mutation)?;
                Ok(place)
            })
            .await?;
        self.request_background_sync("place updated");
        Ok(place)
    }

    /// Delete locally right away and queue the delete; returns the removed place
    pub async fn delete_place(&self, id: &LocalId) -> Result<Place> {
        let id = id.clone();
        let place = self
            .store
            .write(move |conn| {
                let place = require_place(conn, &id)?;
                SqlitePlaceRepository::new(conn).remove(&place.local_id)?;
                let mutation = NewMutation::delete_place(&place);
                SqliteMutationQueue::new(conn).enqueue(&mutation)?;
                Ok(place)
            })
            .await?;
        self.request_background_sync("place deleted");
        Ok(place)
    }

    /// Attach a photo reference to the end of a place's photo list
    pub async fn add_photo(
        &self,
        place_id: &LocalId,
        uri: impl Into<String>,
        caption: Option<String>,
    ) -> Result<Photo> {
        let uri = uri.into();
        let place_id = place_id.clone();
        let photo = self
            .store
            .write(move |conn| {
                let place = require_place(conn, &place_id)?;
                let photo = Photo::new(place.local_id, uri, caption)?;
                let photo = SqlitePlaceRepository::new(conn).add_photo(&photo)?;
                let mutation = NewMutation::create_photo(&photo)?;
                SqliteMutationQueue::new(conn).enqueue(&mutation)?;
                Ok(photo)
            })
            .await?;
        self.request_background_sync("photo added");
        Ok(photo)
    }

    pub async fn remove_photo(&self, photo_id: &LocalId) -> Result<Photo> {
        let photo_id = photo_id.clone();
        let photo = self
            .store
            .write(move |conn| {
                let photo = LocalStore::find_photo(conn, &photo_id)?
                    .ok_or_else(|| Error::NotFound(format!("photo {photo_id}")))?;
                SqlitePlaceRepository::new(conn).remove_photo(&photo.local_id)?;
                let mutation = NewMutation::delete_photo(&photo);
                SqliteMutationQueue::new(conn).enqueue(&mutation)?;
                Ok(photo)
            })
            .await?;
        self.request_background_sync("photo removed");
        Ok(photo)
    }

    /// Pull the full listing and merge it; places deleted locally stay deleted
    pub async fn refresh_from_server(&self) -> Result<RefreshReport> {
        let api = self.api.as_ref().ok_or_else(|| {
            TransportError::InvalidConfiguration("no API base URL configured".into())
        })?;
        let listing = api.fetch_places().await?;

        let report = self
            .store
            .write(move |conn| {
                let queued = SqliteMutationQueue::new(conn).drain()?;
                let (summary, conflicts) = merge_server_places(conn, &listing, &queued)?;
                Ok(RefreshReport {
                    fetched: listing.len(),
                    inserted: summary.inserted,
                    updated: summary.updated,
                    conflicts,
                })
            })
            .await?;
        tracing::info!(
            fetched = report.fetched,
            inserted = report.inserted,
            updated = report.updated,
            "Refreshed places from server"
        );
        Ok(report)
    }

    /// Local view of sync health, without the live session
    pub async fn status(&self) -> Result<StatusReport> {
        let place_count = self.store.list_places().await?.len();
        let stats = self.store.queue_stats().await?;
        Ok(StatusReport {
            place_count,
            pending_count: stats.pending_count,
            max_retry_count: stats.max_retry_count,
            last_synced_at: self.store.last_synced_at().await?,
            last_error: self.store.last_error().await?,
            is_online: self.is_online(),
            phase: SyncPhase::Idle,
        })
    }

    fn request_background_sync(&self, reason: &str) {
        self.registrar.request_background_sync(reason);
    }
}

fn require_place(conn: &Connection, id: &LocalId) -> Result<Place> {
    LocalStore::find_place(conn, id)?.ok_or_else(|| Error::NotFound(format!("place {id}")))
}
