use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use wander_core::config::{ConfigError, SyncClientConfig};
use wander_core::models::{LocalId, MutationQueueItem, Place};
use wander_core::services::{LocalStore, PlaceService};
use wander_core::sync::HttpSyncClient;

use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceListItem {
    pub id: String,
    pub server_id: Option<String>,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub trip_date: Option<NaiveDate>,
    pub sync_status: String,
    pub photo_count: usize,
    pub updated_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueListItem {
    pub seq: i64,
    pub action: String,
    pub entity: String,
    pub local_id: String,
    pub parent_id: Option<String>,
    pub server_id: Option<String>,
    pub retry_count: u32,
    pub queued_at: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(wander_core::config::database_path_from_env) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("wander").join("wander.db"))
        .ok_or(CliError::NoDataDir)
}

pub async fn open_store(path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(path).await?)
}

/// Resolve the sync configuration, treating a missing base URL as "not configured"
pub fn load_sync_config() -> Result<SyncClientConfig, CliError> {
    sync_config_from_lookup(|key| env::var(key).ok())
}

pub fn sync_config_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SyncClientConfig, CliError> {
    match SyncClientConfig::from_lookup(lookup) {
        Ok(config) => Ok(config),
        Err(ConfigError::MissingVar(_)) => Err(CliError::SyncNotConfigured),
        Err(error) => Err(error.into()),
    }
}

pub fn http_client(config: &SyncClientConfig) -> Result<Arc<HttpSyncClient>, CliError> {
    Ok(Arc::new(HttpSyncClient::from_config(config)?))
}

/// Place service wired to the API when configured, offline otherwise
pub async fn open_place_service(db_path: &Path) -> Result<PlaceService, CliError> {
    let store = open_store(db_path).await?;
    match load_sync_config() {
        Ok(config) => Ok(PlaceService::new(store, http_client(&config)?)),
        Err(CliError::SyncNotConfigured) => Ok(PlaceService::offline(store)),
        Err(error) => Err(error),
    }
}

/// Find a place by exact id (following reconciled ids) or a unique id prefix
pub async fn resolve_place(query: &str, store: &LocalStore) -> Result<Place, CliError> {
    let query = normalize_place_identifier(query)?;
    if let Some(place) = store.get_place(&LocalId::from(query.as_str())).await? {
        return Ok(place);
    }

    let mut matching = store
        .list_places()
        .await?
        .into_iter()
        .filter(|place| place.local_id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::PlaceNotFound(query)),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|place| short_id(place.local_id.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousPlaceId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn normalize_place_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyPlaceId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn resolve_place_name(name_parts: &[String]) -> Result<String, CliError> {
    let name = name_parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        Err(CliError::EmptyName)
    } else {
        Ok(name)
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_place_lines(places: &[Place]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    places
        .iter()
        .map(|place| {
            let short_id = short_id(place.local_id.as_str());
            let relative_time = format_relative_time(place.updated_at, now_ms);
            let status = place.sync_status.as_str();
            let trip = place
                .trip_date
                .map(|date| format!("  trip {date}"))
                .unwrap_or_default();
            format!(
                "{short_id:<13}  {:<32}  {:>9.4},{:>10.4}  {status:<8}  {relative_time}{trip}",
                truncate(&place.name, 32),
                place.location.latitude,
                place.location.longitude,
            )
        })
        .collect()
}

pub fn place_to_list_item(place: &Place) -> PlaceListItem {
    let now_ms = Utc::now().timestamp_millis();
    PlaceListItem {
        id: place.local_id.to_string(),
        server_id: place.server_id.clone(),
        name: place.name.clone(),
        lat: place.location.latitude,
        lng: place.location.longitude,
        trip_date: place.trip_date,
        sync_status: place.sync_status.to_string(),
        photo_count: place.photos.len(),
        updated_at: place.updated_at,
        relative_time: format_relative_time(place.updated_at, now_ms),
    }
}

pub fn queue_item_to_list_item(item: &MutationQueueItem) -> QueueListItem {
    QueueListItem {
        seq: item.seq,
        action: item.action.to_string(),
        entity: item.entity.to_string(),
        local_id: item.local_id.to_string(),
        parent_id: item.parent_id.as_ref().map(ToString::to_string),
        server_id: item.server_id.clone(),
        retry_count: item.retry_count,
        queued_at: format_timestamp_ms(item.queued_at),
    }
}

pub fn format_queue_lines(items: &[MutationQueueItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let retries = if item.retry_count > 0 {
                format!("  retries={}", item.retry_count)
            } else {
                String::new()
            };
            format!(
                "#{:<5} {:<6} {:<5} {}  {}{retries}",
                item.seq,
                item.action.as_str(),
                item.entity.as_str(),
                short_id(item.local_id.as_str()),
                format_timestamp_ms(item.queued_at),
            )
        })
        .collect()
}

pub fn format_timestamp_ms(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_watermark(watermark: Option<DateTime<Utc>>) -> String {
    watermark.map_or_else(
        || "never".to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut truncated = value
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
