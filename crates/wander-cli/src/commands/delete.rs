use std::path::Path;

use crate::commands::common::{open_place_service, resolve_place};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let service = open_place_service(db_path).await?;
    let place = resolve_place(id, service.store()).await?;

    let deleted = service.delete_place(&place.local_id).await?;
    println!("{}", deleted.local_id);
    Ok(())
}
