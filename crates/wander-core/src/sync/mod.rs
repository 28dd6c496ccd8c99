//! Offline-first synchronization with the places API.
//!
//! Local writes land in the mutation queue; the orchestrator decides when a
//! cycle runs and the engine performs it.

mod background;
mod client;
mod connectivity;
mod engine;
mod machine;
mod orchestrator;
mod protocol;
mod reconciler;

#[cfg(test)]
pub(crate) mod testing;

pub use background::{BackgroundSyncRegistrar, NoopRegistrar};
pub use client::{HttpSyncClient, SyncApi, TransportError};
pub use connectivity::ConnectivityMonitor;
pub use engine::{CycleOutcome, CycleReport, SyncEngine};
pub use machine::{transition, CooldownPolicy, SyncEffect, SyncEvent, TriggerSource};
pub use orchestrator::{OrchestratorConfig, SyncHandle, SyncOrchestrator};
pub use protocol::{
    IdMapping, ServerPhoto, ServerPlace, SyncAction, SyncBatchResult, SyncRequest, SyncResponse,
};
pub use reconciler::{IdReconciler, ReconcileOutcome};

pub(crate) use engine::merge_server_places;
