//! Scriptable in-process `SyncApi` used by the engine, orchestrator and service tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::models::NewPlace;

use super::client::{SyncApi, TransportError};
use super::protocol::{ServerPlace, SyncBatchResult, SyncRequest};

/// Holds one `bulk_sync` call open until released
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until the held call has started
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
pub struct FakeSyncApi {
    responses: Mutex<VecDeque<Result<SyncBatchResult, TransportError>>>,
    requests: Mutex<Vec<SyncRequest>>,
    gate: Mutex<Option<Arc<Gate>>>,
    created: Mutex<VecDeque<Result<ServerPlace, TransportError>>>,
    created_requests: Mutex<Vec<NewPlace>>,
    listing: Mutex<Vec<ServerPlace>>,
    unhealthy: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSyncApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: Result<SyncBatchResult, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_created(&self, response: Result<ServerPlace, TransportError>) {
        self.created.lock().unwrap().push_back(response);
    }

    pub fn set_listing(&self, places: Vec<ServerPlace>) {
        *self.listing.lock().unwrap() = places;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// Hold the next `bulk_sync` call until the returned gate is released
    pub fn hold_next(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn created_requests(&self) -> Vec<NewPlace> {
        self.created_requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl SyncApi for FakeSyncApi {
    async fn bulk_sync(&self, request: SyncRequest) -> Result<SyncBatchResult, TransportError> {
        self.requests.lock().unwrap().push(request);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no scripted response".into())));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }

    async fn create_place(&self, place: NewPlace) -> Result<ServerPlace, TransportError> {
        self.created_requests.lock().unwrap().push(place);
        self.created
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no scripted response".into())))
    }

    async fn fetch_places(&self) -> Result<Vec<ServerPlace>, TransportError> {
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn health_check(&self) -> bool {
        !self.unhealthy.load(Ordering::SeqCst)
    }
}
