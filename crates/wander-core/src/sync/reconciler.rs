//! Client id to server id reconciliation.
//!
//! Once the server acknowledges a create, every piece of local state that
//! refers to the client-generated id is rewritten to the server id. Callers
//! run this inside the same transaction that applies the rest of the sync
//! response.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::EntityKind;
use crate::util::now_millis;

/// What a single reconciliation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The entity was re-keyed under its server id
    Rewritten(EntityKind),
    /// A row keyed by the server id already existed; the local row was folded into it
    Merged(EntityKind),
    /// The entity already carried the server id as its key
    AlreadyMapped(EntityKind),
    /// No entity with the local id exists; the store was left untouched
    Missing,
}

/// Rewrites local identifiers to server identifiers
pub struct IdReconciler<'a> {
    conn: &'a Connection,
}

impl<'a> IdReconciler<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Re-key the entity `local_id` as `server_id` along with everything that references it
    pub fn reconcile(&self, local_id: &str, server_id: &str) -> Result<ReconcileOutcome> {
        let outcome = if self.exists("places", local_id)? {
            self.rekey(EntityKind::Place, local_id, server_id)?
        } else if self.exists("photos", local_id)? {
            self.rekey(EntityKind::Photo, local_id, server_id)?
        } else {
            tracing::warn!(local_id, server_id, "Reconciliation miss: no local entity");
            ReconcileOutcome::Missing
        };

        if outcome != ReconcileOutcome::Missing {
            self.rewrite_queue(local_id, server_id)?;
        }
        self.record_mapping(local_id, server_id)?;

        tracing::debug!(local_id, server_id, ?outcome, "Reconciled id");
        Ok(outcome)
    }

    /// Follow a recorded mapping for an id that may have been reconciled since it was read
    pub fn resolve(&self, local_id: &str) -> Result<Option<String>> {
        let server_id = self
            .conn
            .query_row(
                "SELECT server_id FROM id_mappings WHERE local_id = ?1",
                params![local_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(server_id)
    }

    fn exists(&self, table: &str, local_id: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE local_id = ?1)"),
            params![local_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn rekey(
        &self,
        entity: EntityKind,
        local_id: &str,
        server_id: &str,
    ) -> Result<ReconcileOutcome> {
        let table = match entity {
            EntityKind::Place => "places",
            EntityKind::Photo => "photos",
        };

        if local_id == server_id {
            self.conn.execute(
                &format!("UPDATE {table} SET server_id = ?1 WHERE local_id = ?1"),
                params![server_id],
            )?;
            return Ok(ReconcileOutcome::AlreadyMapped(entity));
        }

        // A row already keyed by the server id was seeded from a listing or an earlier merge
        let existing: Option<String> = self
            .conn
            .query_row(
                &format!(
                    "SELECT local_id FROM {table}
                     WHERE (local_id = ?1 OR server_id = ?1) AND local_id != ?2"
                ),
                params![server_id, local_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(existing) = existing {
            if entity == EntityKind::Place {
                self.conn.execute(
                    "UPDATE photos SET place_id = ?1 WHERE place_id = ?2",
                    params![existing, local_id],
                )?;
            }
            self.conn.execute(
                &format!("DELETE FROM {table} WHERE local_id = ?1"),
                params![local_id],
            )?;
            self.conn.execute(
                &format!("UPDATE {table} SET server_id = ?1 WHERE local_id = ?2"),
                params![server_id, existing],
            )?;
            return Ok(ReconcileOutcome::Merged(entity));
        }

        // Photo ownership follows through ON UPDATE CASCADE
        self.conn.execute(
            &format!("UPDATE {table} SET local_id = ?1, server_id = ?1 WHERE local_id = ?2"),
            params![server_id, local_id],
        )?;
        Ok(ReconcileOutcome::Rewritten(entity))
    }

    fn rewrite_queue(&self, local_id: &str, server_id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE mutation_queue SET local_id = ?1, server_id = ?1 WHERE local_id = ?2",
            params![server_id, local_id],
        )?;
        self.conn.execute(
            "UPDATE mutation_queue SET parent_id = ?1 WHERE parent_id = ?2",
            params![server_id, local_id],
        )?;
        Ok(())
    }

    fn record_mapping(&self, local_id: &str, server_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO id_mappings (local_id, server_id, mapped_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(local_id) DO UPDATE SET
                server_id = excluded.server_id,
                mapped_at = excluded.mapped_at",
            params![local_id, server_id, now_millis()],
        )?;
        Ok(())
    }
}
