//! Database layer for Wander

use rusqlite::types::Type;

mod connection;
mod meta_repository;
mod migrations;
mod place_repository;
mod queue_repository;

pub use connection::Database;
pub use meta_repository::{SqliteSyncMetaRepository, SyncMetaRepository};
pub use place_repository::{MergeSummary, PlaceRepository, SqlitePlaceRepository};
pub use queue_repository::{MutationQueue, QueueSnapshot, SqliteMutationQueue};

/// Wrap a column value that failed to parse into a rusqlite error
fn conversion_error(
    column: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
}
