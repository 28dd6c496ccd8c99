use std::path::Path;

use wander_core::services::StatusReport;

use crate::commands::common::{format_watermark, open_place_service};
use crate::error::CliError;

pub fn format_status_lines(status: &StatusReport) -> Vec<String> {
    let sync_mode = if status.is_online {
        "configured"
    } else {
        "offline only"
    };
    let mut lines = vec![
        format!("Places:      {}", status.place_count),
        format!(
            "Queued:      {} (max retries {})",
            status.pending_count, status.max_retry_count
        ),
        format!("Last synced: {}", format_watermark(status.last_synced_at)),
        format!("Sync:        {sync_mode}"),
    ];
    if let Some(error) = &status.last_error {
        lines.push(format!("Last error:  {error}"));
    }
    lines
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = open_place_service(db_path).await?;
    let status = service.status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}
