//! Hook for asking the platform to sync later.

use super::machine::TriggerSource;
use super::orchestrator::SyncHandle;

/// Receives a request whenever local work is queued that should reach the
/// server even if the app is not in the foreground.
pub trait BackgroundSyncRegistrar: Send + Sync {
    fn request_background_sync(&self, reason: &str);
}

/// Registrar for hosts without a background scheduler
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistrar;

impl BackgroundSyncRegistrar for NoopRegistrar {
    fn request_background_sync(&self, reason: &str) {
        tracing::debug!(reason, "No background sync scheduler; request ignored");
    }
}

impl BackgroundSyncRegistrar for SyncHandle {
    fn request_background_sync(&self, reason: &str) {
        tracing::debug!(reason, "Background sync requested");
        self.request_sync(TriggerSource::Background);
    }
}
