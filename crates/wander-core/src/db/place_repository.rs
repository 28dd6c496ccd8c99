//! Local entity store for places and their photo references

use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{GeoPoint, LocalId, Photo, Place, SyncStatus};
use crate::sync::{ServerPhoto, ServerPlace};
use crate::util::now_millis;

use super::conversion_error;

const TRIP_DATE_FORMAT: &str = "%Y-%m-%d";

const PLACE_COLUMNS: &str = "local_id, server_id, name, latitude, longitude, trip_date, \
                             sync_status, created_at, updated_at";

const PHOTO_COLUMNS: &str =
    "local_id, server_id, place_id, uri, caption, position, sync_status, created_at";

/// Outcome of merging authoritative server data into the local store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Local ids of every place written by the merge
    pub merged: Vec<LocalId>,
    pub inserted: usize,
    pub updated: usize,
}

/// Trait for local place storage operations
pub trait PlaceRepository {
    /// Insert or update a place (and the photos it carries), keyed by local id
    fn save(&self, place: &Place) -> Result<()>;

    /// Get a place by local id
    fn get(&self, id: &LocalId) -> Result<Option<Place>>;

    /// Get a place by its server-assigned id
    fn find_by_server_id(&self, server_id: &str) -> Result<Option<Place>>;

    /// All places, most recently updated first
    fn get_all(&self) -> Result<Vec<Place>>;

    /// Delete a place and its photos; returns whether it existed
    fn remove(&self, id: &LocalId) -> Result<bool>;

    /// Overwrite or insert places from an authoritative server response
    fn merge_from_server(&self, places: &[ServerPlace]) -> Result<MergeSummary>;

    /// Mark places that still have queued mutations as conflicting
    fn flag_superseded(&self, ids: &[LocalId]) -> Result<usize>;

    /// Mark places and photos with no queued mutations left as synced
    fn mark_synced(&self, ids: &[LocalId]) -> Result<usize>;

    /// Append a photo to its place, assigning the next position
    fn add_photo(&self, photo: &Photo) -> Result<Photo>;

    /// Get a photo by local id
    fn get_photo(&self, id: &LocalId) -> Result<Option<Photo>>;

    /// Delete a photo; returns whether it existed
    fn remove_photo(&self, id: &LocalId) -> Result<bool>;
}

/// `SQLite` implementation of `PlaceRepository`
pub struct SqlitePlaceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePlaceRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn upsert_place_row(&self, place: &Place) -> Result<()> {
        self.conn.execute(
            "INSERT INTO places (local_id, server_id, name, latitude, longitude, trip_date,
                                 sync_status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(local_id) DO UPDATE SET
                server_id = excluded.server_id,
                name = excluded.name,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                trip_date = excluded.trip_date,
                sync_status = excluded.sync_status,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                place.local_id.as_str(),
                place.server_id,
                place.name,
                place.location.latitude,
                place.location.longitude,
                place
                    .trip_date
                    .map(|date| date.format(TRIP_DATE_FORMAT).to_string()),
                place.sync_status.as_str(),
                place.created_at,
                place.updated_at,
            ],
        )?;
        Ok(())
    }

    fn upsert_photo_row(&self, photo: &Photo) -> Result<()> {
        self.conn.execute(
            "INSERT INTO photos (local_id, server_id, place_id, uri, caption, position,
                                 sync_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(local_id) DO UPDATE SET
                server_id = excluded.server_id,
                place_id = excluded.place_id,
                uri = excluded.uri,
                caption = excluded.caption,
                position = excluded.position,
                sync_status = excluded.sync_status",
            params![
                photo.local_id.as_str(),
                photo.server_id,
                photo.place_id.as_str(),
                photo.uri,
                photo.caption,
                photo.position,
                photo.sync_status.as_str(),
                photo.created_at,
            ],
        )?;
        Ok(())
    }

    fn load_photos(&self, place_id: &LocalId) -> Result<Vec<Photo>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE place_id = ?1 ORDER BY position, created_at"
        ))?;
        let photos = stmt
            .query_map(params![place_id.as_str()], Self::parse_photo)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(photos)
    }

    fn query_one(&self, filter: &str, value: &str) -> Result<Option<Place>> {
        let place = self
            .conn
            .query_row(
                &format!("SELECT {PLACE_COLUMNS} FROM places WHERE {filter} = ?1"),
                params![value],
                Self::parse_place,
            )
            .optional()?;

        match place {
            Some(mut place) => {
                place.photos = self.load_photos(&place.local_id)?;
                Ok(Some(place))
            }
            None => Ok(None),
        }
    }

    fn merge_place(&self, incoming: &ServerPlace, summary: &mut MergeSummary) -> Result<()> {
        let now = now_millis();
        let created_at = incoming.created_at.map_or(now, |ts| ts.timestamp_millis());
        let updated_at = incoming
            .updated_at
            .map_or(created_at.max(now), |ts| ts.timestamp_millis());
        let trip_date = incoming
            .trip_date
            .map(|date| date.format(TRIP_DATE_FORMAT).to_string());

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT local_id FROM places WHERE server_id = ?1",
                params![incoming.id],
                |row| row.get(0),
            )
            .optional()?;

        let local_id = if let Some(local_id) = existing {
            self.conn.execute(
                "UPDATE places SET name = ?2, latitude = ?3, longitude = ?4, trip_date = ?5,
                                   sync_status = 'synced', created_at = ?6, updated_at = ?7
                 WHERE local_id = ?1",
                params![
                    local_id,
                    incoming.name,
                    incoming.latitude,
                    incoming.longitude,
                    trip_date,
                    created_at,
                    updated_at,
                ],
            )?;
            summary.updated += 1;
            LocalId::from(local_id)
        } else {
            let place = Place {
                local_id: LocalId::from(incoming.id.as_str()),
                server_id: Some(incoming.id.clone()),
                name: incoming.name.clone(),
                location: incoming.location(),
                trip_date: incoming.trip_date,
                sync_status: SyncStatus::Synced,
                created_at,
                updated_at,
                photos: Vec::new(),
            };
            self.upsert_place_row(&place)?;
            summary.inserted += 1;
            place.local_id
        };

        for (position, photo) in incoming.photos.iter().enumerate() {
            let position = i64::try_from(position).unwrap_or(i64::MAX);
            self.merge_photo(&local_id, photo, position)?;
        }

        summary.merged.push(local_id);
        Ok(())
    }

    fn merge_photo(
        &self,
        place_id: &LocalId,
        server_photo: &ServerPhoto,
        position: i64,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE photos SET place_id = ?2, uri = ?3, caption = ?4, position = ?5,
                               sync_status = 'synced'
             WHERE server_id = ?1",
            params![
                server_photo.id,
                place_id.as_str(),
                server_photo.uri,
                server_photo.caption,
                position
            ],
        )?;

        if updated == 0 {
            let photo = Photo {
                local_id: LocalId::from(server_photo.id.as_str()),
                server_id: Some(server_photo.id.clone()),
                place_id: place_id.clone(),
                uri: server_photo.uri.clone(),
                caption: server_photo.caption.clone(),
                position,
                sync_status: SyncStatus::Synced,
                created_at: server_photo
                    .created_at
                    .map_or_else(now_millis, |ts| ts.timestamp_millis()),
            };
            self.upsert_photo_row(&photo)?;
        }
        Ok(())
    }

    /// Parse a place from a database row (photos are loaded separately)
    fn parse_place(row: &rusqlite::Row<'_>) -> rusqlite::Result<Place> {
        let local_id: String = row.get(0)?;
        let trip_date: Option<String> = row.get(5)?;
        let sync_status: String = row.get(6)?;
        Ok(Place {
            local_id: LocalId::from(local_id),
            server_id: row.get(1)?,
            name: row.get(2)?,
            location: GeoPoint {
                latitude: row.get(3)?,
                longitude: row.get(4)?,
            },
            trip_date: trip_date
                .map(|value| parse_trip_date(5, &value))
                .transpose()?,
            sync_status: parse_sync_status(6, &sync_status)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            photos: Vec::new(),
        })
    }

    /// Parse a photo from a database row
    fn parse_photo(row: &rusqlite::Row<'_>) -> rusqlite::Result<Photo> {
        let local_id: String = row.get(0)?;
        let place_id: String = row.get(2)?;
        let sync_status: String = row.get(6)?;
        Ok(Photo {
            local_id: LocalId::from(local_id),
            server_id: row.get(1)?,
            place_id: LocalId::from(place_id),
            uri: row.get(3)?,
            caption: row.get(4)?,
            position: row.get(5)?,
            sync_status: parse_sync_status(6, &sync_status)?,
            created_at: row.get(7)?,
        })
    }
}

fn parse_trip_date(column: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, TRIP_DATE_FORMAT)
        .map_err(|error| conversion_error(column, error))
}

fn parse_sync_status(column: usize, value: &str) -> rusqlite::Result<SyncStatus> {
    value
        .parse()
        .map_err(|error| conversion_error(column, error))
}

impl PlaceRepository for SqlitePlaceRepository<'_> {
    fn save(&self, place: &Place) -> Result<()> {
        self.upsert_place_row(place)?;
        for photo in &place.photos {
            self.upsert_photo_row(photo)?;
        }
        Ok(())
    }

    fn get(&self, id: &LocalId) -> Result<Option<Place>> {
        self.query_one("local_id", id.as_str())
    }

    fn find_by_server_id(&self, server_id: &str) -> Result<Option<Place>> {
        self.query_one("server_id", server_id)
    }

    fn get_all(&self) -> Result<Vec<Place>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLACE_COLUMNS} FROM places ORDER BY updated_at DESC, created_at DESC"
        ))?;
        let mut places = stmt
            .query_map([], Self::parse_place)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos ORDER BY place_id, position, created_at"
        ))?;
        let mut photos_by_place: HashMap<LocalId, Vec<Photo>> = HashMap::new();
        for photo in stmt.query_map([], Self::parse_photo)? {
            let photo = photo?;
            photos_by_place
                .entry(photo.place_id.clone())
                .or_default()
                .push(photo);
        }

        for place in &mut places {
            if let Some(photos) = photos_by_place.remove(&place.local_id) {
                place.photos = photos;
            }
        }

        Ok(places)
    }

    fn remove(&self, id: &LocalId) -> Result<bool> {
        let sql = "DELETE FROM places WHERE local_id = ?1";
        let rows = self.conn.execute(sql, params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn merge_from_server(&self, places: &[ServerPlace]) -> Result<MergeSummary> {
        let mut summary = MergeSummary::default();
        for incoming in places {
            self.merge_place(incoming, &mut summary)?;
        }
        Ok(summary)
    }

    fn flag_superseded(&self, ids: &[LocalId]) -> Result<usize> {
        let mut flagged = 0;
        for id in ids {
            flagged += self.conn.execute(
                "UPDATE places SET sync_status = 'conflict'
                 WHERE local_id = ?1
                   AND EXISTS(SELECT 1 FROM mutation_queue WHERE local_id = ?1)",
                params![id.as_str()],
            )?;
        }
        Ok(flagged)
    }

    fn mark_synced(&self, ids: &[LocalId]) -> Result<usize> {
        let mut marked = 0;
        for id in ids {
            for table in ["places", "photos"] {
                marked += self.conn.execute(
                    &format!(
                        "UPDATE {table} SET sync_status = 'synced'
                         WHERE local_id = ?1
                           AND NOT EXISTS(SELECT 1 FROM mutation_queue WHERE local_id = ?1)"
                    ),
                    params![id.as_str()],
                )?;
            }
        }
        Ok(marked)
    }

    fn add_photo(&self, photo: &Photo) -> Result<Photo> {
        let next_position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM photos WHERE place_id = ?1",
            params![photo.place_id.as_str()],
            |row| row.get(0),
        )?;

        let photo = Photo {
            position: next_position,
            ..photo.clone()
        };
        self.upsert_photo_row(&photo)?;
        Ok(photo)
    }

    fn get_photo(&self, id: &LocalId) -> Result<Option<Photo>> {
        let photo = self
            .conn
            .query_row(
                &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE local_id = ?1"),
                params![id.as_str()],
                Self::parse_photo,
            )
            .optional()?;
        Ok(photo)
    }

    fn remove_photo(&self, id: &LocalId) -> Result<bool> {
        let sql = "DELETE FROM photos WHERE local_id = ?1";
        let rows = self.conn.execute(sql, params![id.as_str()])?;
        Ok(rows > 0)
    }
}
