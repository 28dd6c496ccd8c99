use std::path::Path;

use wander_core::services::PlaceService;

use crate::commands::common::{http_client, load_sync_config, open_store};
use crate::error::CliError;

pub async fn run_pull(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let config = load_sync_config()?;
    let store = open_store(db_path).await?;
    let service = PlaceService::new(store, http_client(&config)?);

    let report = service.refresh_from_server().await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Fetched {} place(s): {} new, {} updated, {} conflict(s)",
            report.fetched, report.inserted, report.updated, report.conflicts
        );
    }
    Ok(())
}
