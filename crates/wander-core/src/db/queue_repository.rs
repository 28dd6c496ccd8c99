//! Durable mutation queue

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{LocalId, MutationQueueItem, NewMutation};

use super::conversion_error;

/// Items captured by a drain, committed or failed as one unit.
///
/// Sequence numbers are `AUTOINCREMENT`, so every item enqueued after the
/// snapshot has a larger `seq` than `high_water`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub items: Vec<MutationQueueItem>,
    pub high_water: i64,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Highest retry counter among the captured items
    pub fn max_retry_count(&self) -> u32 {
        self.items
            .iter()
            .map(|item| item.retry_count)
            .max()
            .unwrap_or_default()
    }
}

/// Trait for mutation queue operations
pub trait MutationQueue {
    /// Append a mutation; the write is committed when this returns
    fn enqueue(&self, mutation: &NewMutation) -> Result<MutationQueueItem>;

    /// All queued items in insertion order, without removing them
    fn drain(&self) -> Result<QueueSnapshot>;

    /// Number of queued items
    fn len(&self) -> Result<usize>;

    /// Remove every queued item
    fn clear(&self) -> Result<usize>;

    /// Remove exactly the items captured by `snapshot`
    fn commit(&self, snapshot: &QueueSnapshot) -> Result<usize>;

    /// Bump the retry counter of every item captured by `snapshot`
    fn record_failure(&self, snapshot: &QueueSnapshot) -> Result<usize>;
}

/// `SQLite` implementation of `MutationQueue`
pub struct SqliteMutationQueue<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteMutationQueue<'a> {
    /// Create a new queue over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a queue item from a database row
    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<MutationQueueItem> {
        let action: String = row.get(1)?;
        let entity: String = row.get(2)?;
        let local_id: String = row.get(3)?;
        let parent_id: Option<String> = row.get(4)?;
        let payload: Option<String> = row.get(6)?;

        Ok(MutationQueueItem {
            seq: row.get(0)?,
            action: action.parse().map_err(|error| conversion_error(1, error))?,
            entity: entity.parse().map_err(|error| conversion_error(2, error))?,
            local_id: LocalId::from(local_id),
            parent_id: parent_id.map(LocalId::from),
            server_id: row.get(5)?,
            payload: payload
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .map_err(|error| conversion_error(6, error))?,
            queued_at: row.get(7)?,
            retry_count: row.get(8)?,
        })
    }

    fn select_all(&self) -> Result<Vec<MutationQueueItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, action, entity, local_id, parent_id, server_id, payload, queued_at,
                    retry_count
             FROM mutation_queue
             ORDER BY seq ASC",
        )?;
        let items = stmt
            .query_map([], Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }
}

impl MutationQueue for SqliteMutationQueue<'_> {
    fn enqueue(&self, mutation: &NewMutation) -> Result<MutationQueueItem> {
        let payload = mutation
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            "INSERT INTO mutation_queue (action, entity, local_id, parent_id, server_id, payload,
                                         queued_at, retry_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                mutation.action.as_str(),
                mutation.entity.as_str(),
                mutation.local_id.as_str(),
                mutation.parent_id.as_ref().map(LocalId::as_str),
                mutation.server_id,
                payload,
                mutation.queued_at,
            ],
        )?;

        let seq = self.conn.last_insert_rowid();
        tracing::debug!(
            seq,
            action = %mutation.action,
            entity = %mutation.entity,
            local_id = %mutation.local_id,
            "Queued mutation"
        );

        Ok(MutationQueueItem {
            seq,
            action: mutation.action,
            entity: mutation.entity,
            local_id: mutation.local_id.clone(),
            parent_id: mutation.parent_id.clone(),
            server_id: mutation.server_id.clone(),
            payload: mutation.payload.clone(),
            queued_at: mutation.queued_at,
            retry_count: 0,
        })
    }

    fn drain(&self) -> Result<QueueSnapshot> {
        let items = self.select_all()?;
        let high_water = items.last().map_or(0, |item| item.seq);
        Ok(QueueSnapshot { items, high_water })
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mutation_queue", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM mutation_queue", [])?)
    }

    fn commit(&self, snapshot: &QueueSnapshot) -> Result<usize> {
        if snapshot.is_empty() {
            return Ok(0);
        }
        let removed = self.conn.execute(
            "DELETE FROM mutation_queue WHERE seq <= ?1",
            params![snapshot.high_water],
        )?;
        Ok(removed)
    }

    fn record_failure(&self, snapshot: &QueueSnapshot) -> Result<usize> {
        if snapshot.is_empty() {
            return Ok(0);
        }
        let bumped = self.conn.execute(
            "UPDATE mutation_queue SET retry_count = retry_count + 1 WHERE seq <= ?1",
            params![snapshot.high_water],
        )?;
        Ok(bumped)
    }
}
