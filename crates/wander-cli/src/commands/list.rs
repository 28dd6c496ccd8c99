use std::path::Path;

use crate::commands::common::{format_place_lines, open_store, place_to_list_item, PlaceListItem};
use crate::error::CliError;

pub async fn run_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let mut places = store.list_places().await?;
    places.truncate(limit);

    if as_json {
        let json_items = places
            .iter()
            .map(place_to_list_item)
            .collect::<Vec<PlaceListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if places.is_empty() {
        println!("No places yet. Add one with `wander add <name> --lat <lat> --lng <lng>`.");
    } else {
        for line in format_place_lines(&places) {
            println!("{line}");
        }
    }

    Ok(())
}
