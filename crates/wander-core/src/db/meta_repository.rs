//! Sync metadata repository implementation

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

const LAST_SYNCED_AT: &str = "last_synced_at";
const LAST_ERROR: &str = "last_error";

/// Trait for sync bookkeeping storage
pub trait SyncMetaRepository {
    /// Load the server watermark of the last successful sync
    fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>>;

    /// Persist the server watermark
    fn set_last_synced_at(&self, synced_at: DateTime<Utc>) -> Result<()>;

    /// Message of the most recent failed sync, cleared on success
    fn last_error(&self) -> Result<Option<String>>;

    /// Record or clear the most recent sync failure
    fn set_last_error(&self, message: Option<&str>) -> Result<()>;
}

/// `SQLite` implementation of `SyncMetaRepository`
pub struct SqliteSyncMetaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncMetaRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete_value(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_meta WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl SyncMetaRepository for SqliteSyncMetaRepository<'_> {
    fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.get_value(LAST_SYNCED_AT)? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(parsed) => Ok(Some(parsed.with_timezone(&Utc))),
            Err(error) => {
                tracing::warn!(%error, value = %raw, "Discarding unreadable sync watermark");
                Ok(None)
            }
        }
    }

    fn set_last_synced_at(&self, synced_at: DateTime<Utc>) -> Result<()> {
        self.set_value(LAST_SYNCED_AT, &synced_at.to_rfc3339())
    }

    fn last_error(&self) -> Result<Option<String>> {
        self.get_value(LAST_ERROR)
    }

    fn set_last_error(&self, message: Option<&str>) -> Result<()> {
        match message {
            Some(message) => self.set_value(LAST_ERROR, message),
            None => self.delete_value(LAST_ERROR),
        }
    }
}
