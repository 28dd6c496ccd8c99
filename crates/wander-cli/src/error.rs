use std::io;

use thiserror::Error;
use wander_core::config::ConfigError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] wander_core::Error),
    #[error(transparent)]
    Transport(#[from] wander_core::sync::TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Place name cannot be empty")]
    EmptyName,
    #[error("Place ID cannot be empty")]
    EmptyPlaceId,
    #[error("Place not found for id/prefix: {0}")]
    PlaceNotFound(String),
    #[error("{0}")]
    AmbiguousPlaceId(String),
    #[error("Nothing to change; pass --name, --lat/--lng, --trip-date or --clear-trip-date")]
    EmptyEdit,
    #[error("Could not resolve a data directory for the local database")]
    NoDataDir,
    #[error("Sync is not configured; set WANDER_API_BASE_URL to enable `wander sync`")]
    SyncNotConfigured,
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
