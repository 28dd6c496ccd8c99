use std::path::Path;

use wander_core::models::LocalId;

use crate::cli::PhotoCommands;
use crate::commands::common::{normalize_place_identifier, open_place_service, resolve_place};
use crate::error::CliError;

pub async fn run_photo(command: PhotoCommands, db_path: &Path) -> Result<(), CliError> {
    let service = open_place_service(db_path).await?;
    match command {
        PhotoCommands::Add {
            place_id,
            uri,
            caption,
        } => {
            let place = resolve_place(&place_id, service.store()).await?;
            let photo = service.add_photo(&place.local_id, uri, caption).await?;
            println!("{}", photo.local_id);
        }
        PhotoCommands::Remove { photo_id } => {
            let photo_id = LocalId::from(normalize_place_identifier(&photo_id)?);
            let photo = service.remove_photo(&photo_id).await?;
            println!("{}", photo.local_id);
        }
    }
    Ok(())
}
