use std::path::Path;

use chrono::NaiveDate;
use wander_core::models::{GeoPoint, PlacePatch};

use crate::commands::common::{open_place_service, place_to_list_item, resolve_place};
use crate::error::CliError;

/// Field changes requested on the command line
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EditArgs {
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub trip_date: Option<NaiveDate>,
    pub clear_trip_date: bool,
}

impl EditArgs {
    pub fn into_patch(self) -> Result<PlacePatch, CliError> {
        let location = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)?),
            _ => None,
        };
        let trip_date = if self.clear_trip_date {
            Some(None)
        } else {
            self.trip_date.map(Some)
        };

        let patch = PlacePatch {
            name: self.name,
            location,
            trip_date,
        };
        if patch.is_empty() {
            return Err(CliError::EmptyEdit);
        }
        Ok(patch)
    }
}

pub async fn run_edit(
    id: &str,
    args: EditArgs,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let patch = args.into_patch()?;
    let service = open_place_service(db_path).await?;
    let place = resolve_place(id, service.store()).await?;

    let updated = service.update_place(&place.local_id, patch).await?;
    if as_json {
        let item = place_to_list_item(&updated);
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("{}", updated.local_id);
    }
    Ok(())
}
