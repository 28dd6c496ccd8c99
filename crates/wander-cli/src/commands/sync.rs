use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use wander_core::sync::{CycleOutcome, SyncEngine};

use crate::commands::common::{format_watermark, http_client, load_sync_config, open_store};
use crate::error::CliError;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub skipped: bool,
    pub sent: usize,
    pub reconciled: usize,
    pub merged: usize,
    pub conflicts: usize,
    pub remaining: usize,
    pub synced_at: Option<DateTime<Utc>>,
}

impl From<&CycleOutcome> for SyncSummary {
    fn from(outcome: &CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::Skipped => Self {
                skipped: true,
                ..Self::default()
            },
            CycleOutcome::Synced(report) => Self {
                skipped: false,
                sent: report.sent,
                reconciled: report.reconciled,
                merged: report.merged,
                conflicts: report.conflicts,
                remaining: report.remaining.pending_count,
                synced_at: Some(report.synced_at),
            },
        }
    }
}

pub fn format_sync_summary(summary: &SyncSummary) -> String {
    if summary.skipped {
        return "Nothing to sync".to_string();
    }
    let mut line = format!(
        "Synced {} change(s) at {}: {} reconciled, {} merged",
        summary.sent,
        format_watermark(summary.synced_at),
        summary.reconciled,
        summary.merged
    );
    if summary.conflicts > 0 {
        line.push_str(&format!(", {} conflict(s)", summary.conflicts));
    }
    if summary.remaining > 0 {
        line.push_str(&format!(", {} still queued", summary.remaining));
    }
    line
}

pub async fn run_sync(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let config = load_sync_config()?;
    let store = open_store(db_path).await?;
    let engine = SyncEngine::new(store, http_client(&config)?);

    let outcome = engine.run_cycle().await?;
    let summary = SyncSummary::from(&outcome);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_sync_summary(&summary));
    }
    Ok(())
}
