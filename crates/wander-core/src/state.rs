//! Shared sync session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the sync orchestrator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    Success,
    Error,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Whether the orchestrator is resting after a finished cycle
    pub const fn is_cooling_down(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the orchestrator, published to observers after every transition
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    pub phase: SyncPhase,
    /// Server watermark of the last successful cycle
    pub last_synced_at: Option<DateTime<Utc>>,
    pub pending_count: usize,
    /// Highest retry counter among queued items
    pub max_retry_count: u32,
    pub is_online: bool,
    pub last_error: Option<String>,
    /// A trigger arrived during the cool-down and runs once it ends
    pub pending_trigger: bool,
}

impl SyncSession {
    pub fn new(is_online: bool) -> Self {
        Self {
            is_online,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_watermark(mut self, last_synced_at: Option<DateTime<Utc>>) -> Self {
        self.last_synced_at = last_synced_at;
        self
    }

    #[must_use]
    pub const fn with_queue(mut self, pending_count: usize, max_retry_count: u32) -> Self {
        self.pending_count = pending_count;
        self.max_retry_count = max_retry_count;
        self
    }
}
