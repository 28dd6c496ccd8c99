use std::path::Path;

use crate::commands::common::{
    format_queue_lines, open_store, queue_item_to_list_item, QueueListItem,
};
use crate::error::CliError;

pub async fn run_queue(clear: bool, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;

    if clear {
        let removed = store.clear_queue().await?;
        println!("Removed {removed} queued mutation(s)");
        return Ok(());
    }

    let snapshot = store.pending_mutations().await?;
    if as_json {
        let json_items = snapshot
            .items
            .iter()
            .map(queue_item_to_list_item)
            .collect::<Vec<QueueListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if snapshot.is_empty() {
        println!("Queue is empty.");
    } else {
        for line in format_queue_lines(&snapshot.items) {
            println!("{line}");
        }
    }
    Ok(())
}
