//! Online/offline signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::client::SyncApi;
use super::orchestrator::SyncHandle;

/// Publishes connectivity changes; only real flips notify subscribers
#[derive(Clone)]
pub struct ConnectivityMonitor {
    sender: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Returns `true` when the state actually changed
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            tracing::info!(online, "Connectivity changed");
        }
        changed
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Check the API health endpoint and record the result
    pub async fn check<A: SyncApi>(&self, api: &A) -> bool {
        let online = api.health_check().await;
        self.set_online(online);
        online
    }

    /// Re-check on a fixed period until the monitor is dropped
    pub fn spawn_checks<A: SyncApi>(&self, api: Arc<A>, period: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                monitor.check(api.as_ref()).await;
            }
        })
    }

    /// Push every change into the orchestrator
    pub fn forward_to(&self, handle: SyncHandle) -> JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            handle.set_online(*receiver.borrow_and_update());
            while receiver.changed().await.is_ok() {
                let online = *receiver.borrow_and_update();
                handle.set_online(online);
            }
        })
    }
}
