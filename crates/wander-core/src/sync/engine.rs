//! One sync cycle: snapshot the queue, send it, apply the response.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::db::{
    MergeSummary, MutationQueue, PlaceRepository, QueueSnapshot, SqliteMutationQueue,
    SqlitePlaceRepository, SqliteSyncMetaRepository, SyncMetaRepository,
};
use crate::error::Result;
use crate::models::{EntityKind, LocalId, MutationAction};
use crate::services::{LocalStore, QueueStats};

use super::client::SyncApi;
use super::protocol::{ServerPlace, SyncBatchResult, SyncRequest};
use super::reconciler::{IdReconciler, ReconcileOutcome};

/// Result of a completed cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The queue was empty; nothing was sent
    Skipped,
    Synced(CycleReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Actions sent in the batch
    pub sent: usize,
    pub reconciled: usize,
    pub merged: usize,
    /// Places overwritten by the server while newer local edits are still queued
    pub conflicts: usize,
    pub synced_at: DateTime<Utc>,
    /// Queue state left behind (items enqueued while the request was in flight)
    pub remaining: QueueStats,
}

/// Runs sync cycles against a store and a remote API
pub struct SyncEngine<A> {
    store: LocalStore,
    api: Arc<A>,
}

impl<A> Clone for SyncEngine<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            api: Arc::clone(&self.api),
        }
    }
}

impl<A: SyncApi> SyncEngine<A> {
    pub const fn new(store: LocalStore, api: Arc<A>) -> Self {
        Self { store, api }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Run one cycle.
    ///
    /// On any failure the queue keeps every item; only the retry counters of
    /// the snapshot are bumped.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let (snapshot, watermark) = self.store.read(prepare_snapshot).await?;
        if snapshot.is_empty() {
            tracing::debug!("Mutation queue empty; skipping sync");
            return Ok(CycleOutcome::Skipped);
        }

        let request = SyncRequest::from_items(&snapshot.items, watermark);
        tracing::debug!(
            actions = snapshot.len(),
            high_water = snapshot.high_water,
            "Sending sync batch"
        );

        let result = match self.api.bulk_sync(request).await {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(%error, transient = error.is_transient(), "Sync batch failed");
                self.record_failure(snapshot, error.to_string()).await;
                return Err(error.into());
            }
        };

        let sent = snapshot.clone();
        let applied = self
            .store
            .write(move |conn| apply_batch(conn, &sent, &result))
            .await;

        match applied {
            Ok(report) => {
                tracing::info!(
                    sent = report.sent,
                    reconciled = report.reconciled,
                    merged = report.merged,
                    conflicts = report.conflicts,
                    remaining = report.remaining.pending_count,
                    "Sync completed"
                );
                Ok(CycleOutcome::Synced(report))
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to apply sync response locally");
                self.record_failure(snapshot, error.to_string()).await;
                Err(error)
            }
        }
    }

    async fn record_failure(&self, snapshot: QueueSnapshot, message: String) {
        let recorded = self
            .store
            .write(move |conn| {
                SqliteMutationQueue::new(conn).record_failure(&snapshot)?;
                SqliteSyncMetaRepository::new(conn).set_last_error(Some(&message))
            })
            .await;
        if let Err(error) = recorded {
            tracing::warn!(%error, "Failed to record sync failure");
        }
    }
}

/// Capture the queue and the watermark, filling in server ids learned since enqueue
fn prepare_snapshot(conn: &Connection) -> Result<(QueueSnapshot, Option<DateTime<Utc>>)> {
    let mut snapshot = SqliteMutationQueue::new(conn).drain()?;
    let reconciler = IdReconciler::new(conn);
    for item in &mut snapshot.items {
        if item.server_id.is_none() && item.action != MutationAction::Create {
            item.server_id = reconciler.resolve(item.local_id.as_str())?;
        }
    }
    let watermark = SqliteSyncMetaRepository::new(conn).last_synced_at()?;
    Ok((snapshot, watermark))
}

fn apply_batch(
    conn: &Connection,
    snapshot: &QueueSnapshot,
    result: &SyncBatchResult,
) -> Result<CycleReport> {
    let reconciler = IdReconciler::new(conn);
    let queue = SqliteMutationQueue::new(conn);

    let mut reconciled = 0;
    for mapping in &result.id_mappings {
        let outcome = reconciler.reconcile(&mapping.client_id, &mapping.server_id)?;
        if outcome != ReconcileOutcome::Missing {
            reconciled += 1;
        }
    }

    queue.commit(snapshot)?;

    let mappings: HashMap<&str, &str> = result
        .id_mappings
        .iter()
        .map(|mapping| (mapping.client_id.as_str(), mapping.server_id.as_str()))
        .collect();

    // Items left now were enqueued while the request was in flight
    let remaining = queue.drain()?;
    let (summary, conflicts) = merge_server_places(conn, &result.updated_places, &remaining)?;

    let acknowledged = snapshot
        .items
        .iter()
        .map(|item| {
            let id = item.local_id.as_str();
            LocalId::from(mappings.get(id).copied().unwrap_or(id))
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    SqlitePlaceRepository::new(conn).mark_synced(&acknowledged)?;

    let meta = SqliteSyncMetaRepository::new(conn);
    meta.set_last_synced_at(result.synced_at)?;
    meta.set_last_error(None)?;

    Ok(CycleReport {
        sent: snapshot.len(),
        reconciled,
        merged: summary.merged.len(),
        conflicts,
        synced_at: result.synced_at,
        remaining: QueueStats {
            pending_count: remaining.len(),
            max_retry_count: remaining.max_retry_count(),
        },
    })
}

/// Merge server places, skipping any with a queued local delete.
///
/// Returns the merge summary and how many merged places still have newer
/// local edits queued (now flagged `conflict`).
pub(crate) fn merge_server_places(
    conn: &Connection,
    incoming: &[ServerPlace],
    queued: &QueueSnapshot,
) -> Result<(MergeSummary, usize)> {
    let reconciler = IdReconciler::new(conn);
    let mut pending_deletes: HashSet<String> = HashSet::new();
    for item in &queued.items {
        if item.action == MutationAction::Delete && item.entity == EntityKind::Place {
            pending_deletes.insert(item.local_id.to_string());
            pending_deletes.extend(item.server_id.clone());
            pending_deletes.extend(reconciler.resolve(item.local_id.as_str())?);
        }
    }

    let kept = incoming
        .iter()
        .filter(|place| !pending_deletes.contains(&place.id))
        .cloned()
        .collect::<Vec<_>>();
    if kept.len() < incoming.len() {
        tracing::debug!(
            skipped = incoming.len() - kept.len(),
            "Skipping server places deleted locally"
        );
    }

    let places = SqlitePlaceRepository::new(conn);
    let summary = places.merge_from_server(&kept)?;
    let conflicts = places.flag_superseded(&summary.merged)?;
    Ok((summary, conflicts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, NewMutation, NewPlace, Place, PlacePatch, SyncStatus};
    use crate::sync::protocol::{IdMapping, ServerPlace};
    use crate::sync::testing::FakeSyncApi;
    use crate::sync::TransportError;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn watermark() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn eiffel() -> Place {
        let location = GeoPoint::new(48.8584, 2.2945).unwrap();
        Place::new(NewPlace::new("Eiffel Tower", location)).unwrap()
    }

    fn server_eiffel(id: &str) -> ServerPlace {
        ServerPlace {
            id: id.to_string(),
            name: "Eiffel Tower".to_string(),
            latitude: 48.8584,
            longitude: 2.2945,
            trip_date: None,
            created_at: None,
            updated_at: None,
            photos: Vec::new(),
        }
    }

    async fn create_offline(store: &LocalStore, place: &Place) {
        let place = place.clone();
        store
            .write(move |conn| {
                SqlitePlaceRepository::new(conn).save(&place)?;
                let mutation = NewMutation::create_place(&place)?;
                SqliteMutationQueue::new(conn).enqueue(&mutation)?;
                Ok(())
            })
            .await
            .unwrap();
    }

    fn accept(place: &Place, server_id: &str) -> SyncBatchResult {
        SyncBatchResult {
            id_mappings: vec![IdMapping::new(place.local_id.as_str(), server_id)],
            updated_places: vec![server_eiffel(server_id)],
            synced_at: watermark(),
        }
    }

    #[tokio::test]
    async fn eiffel_tower_round_trip() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let place = eiffel();
        create_offline(&store, &place).await;

        let api = Arc::new(FakeSyncApi::new());
        api.push_response(Ok(accept(&place, "srv-42")));
        let engine = SyncEngine::new(store.clone(), Arc::clone(&api));

        let outcome = engine.run_cycle().await.unwrap();
        let CycleOutcome::Synced(report) = outcome else {
            panic!("expected a synced cycle");
        };
        assert_eq!(report.sent, 1);
        assert_eq!(report.reconciled, 1);
        assert_eq!(report.remaining, QueueStats::default());

        assert_eq!(store.queue_stats().await.unwrap().pending_count, 0);
        let places = store.list_places().await.unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].local_id, LocalId::from("srv-42"));
        assert_eq!(places[0].server_id.as_deref(), Some("srv-42"));
        assert_eq!(places[0].sync_status, SyncStatus::Synced);
        assert_eq!(store.last_synced_at().await.unwrap(), Some(watermark()));

        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].actions[0].client_id, place.local_id.as_str());
        assert_eq!(requests[0].last_synced_at, None);
    }

    #[tokio::test]
    async fn empty_queue_makes_no_request() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let api = Arc::new(FakeSyncApi::new());
        let engine = SyncEngine::new(store, Arc::clone(&api));

        assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Skipped);
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn failure_preserves_queue_and_bumps_retries() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let place = eiffel();
        create_offline(&store, &place).await;
        let before = store.pending_mutations().await.unwrap();

        let api = Arc::new(FakeSyncApi::new());
        api.push_response(Err(TransportError::Http {
            status: 503,
            message: "HTTP 503".into(),
        }));
        let engine = SyncEngine::new(store.clone(), api);

        assert!(engine.run_cycle().await.is_err());

        let after = store.pending_mutations().await.unwrap();
        assert_eq!(after.len(), before.len());
        for (old, new) in before.items.iter().zip(&after.items) {
            assert_eq!(new.seq, old.seq);
            assert_eq!(new.action, old.action);
            assert_eq!(new.local_id, old.local_id);
            assert_eq!(new.payload, old.payload);
            assert_eq!(new.retry_count, old.retry_count + 1);
        }
        assert!(store.last_error().await.unwrap().is_some());
        assert_eq!(
            store.list_places().await.unwrap()[0].local_id,
            place.local_id
        );
    }

    #[tokio::test]
    async fn order_is_preserved_in_request() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let mut place = eiffel();
        create_offline(&store, &place).await;
        let patch = PlacePatch {
            name: Some("Tour Eiffel".into()),
            ..Default::default()
        };
        place.apply_patch(&patch).unwrap();
        let queued = place.clone();
        store
            .write(move |conn| {
                let queue = SqliteMutationQueue::new(conn);
                queue.enqueue(&NewMutation::update_place(&queued, &patch)?)?;
                queue.enqueue(&NewMutation::delete_place(&queued))?;
                SqlitePlaceRepository::new(conn).remove(&queued.local_id)?;
                Ok(())
            })
            .await
            .unwrap();

        let api = Arc::new(FakeSyncApi::new());
        api.push_response(Ok(SyncBatchResult {
            id_mappings: vec![IdMapping::new(place.local_id.as_str(), "srv-1")],
            updated_places: Vec::new(),
            synced_at: watermark(),
        }));
        let engine = SyncEngine::new(store.clone(), Arc::clone(&api));
        engine.run_cycle().await.unwrap();

        let kinds = api.requests()[0]
            .actions
            .iter()
            .map(|action| action.action_type)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                MutationAction::Create,
                MutationAction::Update,
                MutationAction::Delete
            ]
        );
        assert!(store.list_places().await.unwrap().is_empty());
        assert_eq!(store.queue_stats().await.unwrap().pending_count, 0);
    }

    #[tokio::test]
    async fn enqueue_during_flight_survives_and_is_reconciled() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let mut place = eiffel();
        create_offline(&store, &place).await;

        let api = Arc::new(FakeSyncApi::new());
        api.push_response(Ok(accept(&place, "srv-42")));
        let gate = api.hold_next();
        let engine = SyncEngine::new(store.clone(), Arc::clone(&api));

        let cycle = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_cycle().await }
        });
        gate.entered().await;

        // Edit while the request is in flight
        let patch = PlacePatch {
            name: Some("Tour Eiffel".into()),
            ..Default::default()
        };
        place.apply_patch(&patch).unwrap();
        store
            .write(move |conn| {
                SqlitePlaceRepository::new(conn).save(&place)?;
                let mutation = NewMutation::update_place(&place, &patch)?;
                SqliteMutationQueue::new(conn).enqueue(&mutation)?;
                Ok(())
            })
            .await
            .unwrap();
        gate.release();

        let CycleOutcome::Synced(report) = cycle.await.unwrap().unwrap() else {
            panic!("expected a synced cycle");
        };
        assert_eq!(report.remaining.pending_count, 1);
        assert_eq!(report.conflicts, 1);

        let remaining = store.pending_mutations().await.unwrap();
        assert_eq!(remaining.items[0].action, MutationAction::Update);
        assert_eq!(remaining.items[0].local_id, LocalId::from("srv-42"));
        assert_eq!(remaining.items[0].server_id.as_deref(), Some("srv-42"));

        let stored = store.list_places().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sync_status, SyncStatus::Conflict);
    }

    #[tokio::test]
    async fn second_cycle_sends_watermark() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let first = eiffel();
        create_offline(&store, &first).await;

        let api = Arc::new(FakeSyncApi::new());
        api.push_response(Ok(accept(&first, "srv-42")));
        let engine = SyncEngine::new(store.clone(), Arc::clone(&api));
        engine.run_cycle().await.unwrap();

        let second = eiffel();
        create_offline(&store, &second).await;
        api.push_response(Ok(accept(&second, "srv-43")));
        engine.run_cycle().await.unwrap();

        assert_eq!(api.requests()[1].last_synced_at, Some(watermark()));
    }

    #[tokio::test]
    async fn pending_delete_is_not_resurrected_by_merge() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let place = eiffel();
        create_offline(&store, &place).await;

        let api = Arc::new(FakeSyncApi::new());
        api.push_response(Ok(accept(&place, "srv-42")));
        let gate = api.hold_next();
        let engine = SyncEngine::new(store.clone(), Arc::clone(&api));
        let cycle = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_cycle().await }
        });
        gate.entered().await;

        store
            .write(move |conn| {
                SqlitePlaceRepository::new(conn).remove(&place.local_id)?;
                let mutation = NewMutation::delete_place(&place);
                SqliteMutationQueue::new(conn).enqueue(&mutation)?;
                Ok(())
            })
            .await
            .unwrap();
        gate.release();
        cycle.await.unwrap().unwrap();

        assert!(store.list_places().await.unwrap().is_empty());
        let remaining = store.pending_mutations().await.unwrap();
        assert_eq!(remaining.items.len(), 1);
        assert_eq!(remaining.items[0].action, MutationAction::Delete);
    }
}
