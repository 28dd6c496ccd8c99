use std::path::Path;

use chrono::NaiveDate;
use wander_core::models::{GeoPoint, NewPlace};

use crate::cli::LocationArgs;
use crate::commands::common::{open_place_service, place_to_list_item, resolve_place_name};
use crate::error::CliError;

pub async fn run_add(
    name_parts: &[String],
    location: LocationArgs,
    trip_date: Option<NaiveDate>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let name = resolve_place_name(name_parts)?;
    let mut draft = NewPlace::new(name, GeoPoint::new(location.lat, location.lng)?);
    if let Some(trip_date) = trip_date {
        draft = draft.with_trip_date(trip_date);
    }

    let service = open_place_service(db_path).await?;
    let place = service.create_place(draft).await?;

    if as_json {
        let item = place_to_list_item(&place);
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("{}", place.local_id);
    }
    Ok(())
}
