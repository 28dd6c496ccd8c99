//! Shared async handle over the local database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::db::{
    Database, MutationQueue, PlaceRepository, QueueSnapshot, SqliteMutationQueue,
    SqlitePlaceRepository, SqliteSyncMetaRepository, SyncMetaRepository,
};
use crate::models::{LocalId, Photo, Place};
use crate::sync::IdReconciler;
use crate::{Error, Result};

/// Queue depth and the largest retry counter, as seen by the orchestrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending_count: usize,
    pub max_retry_count: u32,
}

/// Thread-safe service for DB and repository operations.
///
/// Every call takes the lock for one synchronous unit of work and runs it on
/// the blocking pool, so no statement or transaction ever lives across an
/// `.await` and commits never stall a runtime worker.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path, creating parent directories.
    ///
    /// A file that is not a `SQLite` database is moved aside and a fresh one
    /// is created in its place.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let path = db_path.clone();
        let db = run_blocking(move || Self::open_or_recover(&path)).await?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = run_blocking(Database::open_in_memory).await?;
        Ok(Self::from_database(db))
    }

    fn open_or_recover(db_path: &Path) -> Result<Database> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match Database::open(db_path) {
            Ok(db) => Ok(db),
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable ({error}); starting a fresh one",
                    db_path.display()
                );
                Self::quarantine_corrupted_db_files(db_path)?;
                Database::open(db_path)
            }
            Err(error) => Err(error),
        }
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        }
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("wander.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        for suffix in ["-wal", "-shm", "-journal"] {
            let mut sidecar = db_path.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
                tracing::warn!("Removed stale database file {}", sidecar.display());
            }
        }

        Ok(())
    }

    /// Run `work` against the connection without a transaction.
    pub async fn read<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db).lock_owned().await;
        run_blocking(move || work(db.connection())).await
    }

    /// Run `work` inside one transaction; nothing is kept unless it returns `Ok`.
    pub async fn write<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db).lock_owned().await;
        run_blocking(move || {
            let tx = db.connection().unchecked_transaction()?;
            let value = work(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
    }

    /// All places, most recently updated first.
    pub async fn list_places(&self) -> Result<Vec<Place>> {
        self.read(|conn| SqlitePlaceRepository::new(conn).get_all())
            .await
    }

    /// Fetch a place, following the id mapping log if it has been reconciled.
    pub async fn get_place(&self, id: &LocalId) -> Result<Option<Place>> {
        let id = id.clone();
        self.read(move |conn| Self::find_place(conn, &id)).await
    }

    pub(crate) fn find_place(conn: &Connection, id: &LocalId) -> Result<Option<Place>> {
        let places = SqlitePlaceRepository::new(conn);
        if let Some(place) = places.get(id)? {
            return Ok(Some(place));
        }
        match IdReconciler::new(conn).resolve(id.as_str())? {
            Some(server_id) => places.get(&LocalId::from(server_id)),
            None => Ok(None),
        }
    }

    pub(crate) fn find_photo(conn: &Connection, id: &LocalId) -> Result<Option<Photo>> {
        let photos = SqlitePlaceRepository::new(conn);
        if let Some(photo) = photos.get_photo(id)? {
            return Ok(Some(photo));
        }
        match IdReconciler::new(conn).resolve(id.as_str())? {
            Some(server_id) => photos.get_photo(&LocalId::from(server_id)),
            None => Ok(None),
        }
    }

    /// Snapshot of the mutation queue without removing anything.
    pub async fn pending_mutations(&self) -> Result<QueueSnapshot> {
        self.read(|conn| SqliteMutationQueue::new(conn).drain())
            .await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.read(|conn| {
            let snapshot = SqliteMutationQueue::new(conn).drain()?;
            Ok(QueueStats {
                pending_count: snapshot.len(),
                max_retry_count: snapshot.max_retry_count(),
            })
        })
        .await
    }

    /// Drop every queued mutation; returns how many were removed.
    pub async fn clear_queue(&self) -> Result<usize> {
        self.write(|conn| SqliteMutationQueue::new(conn).clear())
            .await
    }

    pub async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.read(|conn| SqliteSyncMetaRepository::new(conn).last_synced_at())
            .await
    }

    pub async fn last_error(&self) -> Result<Option<String>> {
        self.read(|conn| SqliteSyncMetaRepository::new(conn).last_error())
            .await
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| Error::Database(format!("Database task failed: {error}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, NewMutation, NewPlace};
    use pretty_assertions::assert_eq;

    fn place() -> Place {
        let location = GeoPoint::new(48.8584, 2.2945).unwrap();
        Place::new(NewPlace::new("Eiffel Tower", location)).unwrap()
    }

    #[tokio::test]
    async fn write_commits_on_ok() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let place = place();

        store
            .write(move |conn| {
                SqlitePlaceRepository::new(conn).save(&place)?;
                let mutation = NewMutation::create_place(&place)?;
                SqliteMutationQueue::new(conn).enqueue(&mutation)?;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(store.list_places().await.unwrap().len(), 1);
        assert_eq!(
            store.queue_stats().await.unwrap(),
            QueueStats {
                pending_count: 1,
                max_retry_count: 0
            }
        );
    }

    #[tokio::test]
    async fn write_rolls_back_on_error() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let place = place();

        let result: Result<()> = store
            .write(move |conn| {
                SqlitePlaceRepository::new(conn).save(&place)?;
                Err(crate::Error::InvalidInput("enqueue refused".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(store.list_places().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_place_follows_id_mapping() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let place = place();
        let original_id = place.local_id.clone();

        store
            .write(move |conn| {
                SqlitePlaceRepository::new(conn).save(&place)?;
                IdReconciler::new(conn).reconcile(place.local_id.as_str(), "srv-42")?;
                Ok(())
            })
            .await
            .unwrap();

        let found = store.get_place(&original_id).await.unwrap().unwrap();
        assert_eq!(found.local_id, LocalId::from("srv-42"));
    }

    #[tokio::test]
    async fn open_path_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("wander.db");

        let store = LocalStore::open_path(&db_path).await.unwrap();
        assert_eq!(store.db_path(), Some(db_path.as_path()));
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn open_path_quarantines_corrupted_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("wander.db");
        std::fs::write(&db_path, vec![b'x'; 4096]).unwrap();
        std::fs::write(tmp.path().join("wander.db-wal"), b"wal").unwrap();

        let store = LocalStore::open_path(&db_path).await.unwrap();
        assert!(store.list_places().await.unwrap().is_empty());

        let backups = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("wander.db.corrupt-")
            })
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn detects_corrupted_db_errors() {
        assert!(LocalStore::is_corrupted_db_error(&crate::Error::Database(
            "SQLite failure: file is not a database".to_string()
        )));
        assert!(!LocalStore::is_corrupted_db_error(
            &crate::Error::InvalidInput("place name cannot be empty".to_string())
        ));
    }
}
