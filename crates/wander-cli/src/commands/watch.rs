use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use wander_core::state::SyncSession;
use wander_core::sync::{
    ConnectivityMonitor, OrchestratorConfig, SyncEngine, SyncOrchestrator, TriggerSource,
};

use crate::commands::common::{format_watermark, http_client, load_sync_config, open_store};
use crate::error::CliError;

pub fn format_session_line(session: &SyncSession) -> String {
    let mut line = format!(
        "[{}] {} queued, last synced {}",
        session.phase,
        session.pending_count,
        format_watermark(session.last_synced_at)
    );
    if !session.is_online {
        line.push_str(" (offline)");
    }
    if let Some(error) = &session.last_error {
        line.push_str(&format!(", last error: {error}"));
    }
    line
}

pub async fn run_watch(check_interval_secs: u64, db_path: &Path) -> Result<(), CliError> {
    let config = load_sync_config()?;
    let store = open_store(db_path).await?;
    let api = http_client(&config)?;

    let monitor = ConnectivityMonitor::new(false);
    monitor.check(api.as_ref()).await;

    let orchestrator_config = OrchestratorConfig::from(&config);
    let engine = SyncEngine::new(store, Arc::clone(&api));
    let (handle, orchestrator) =
        SyncOrchestrator::spawn(engine, orchestrator_config, monitor.is_online()).await?;
    let forwarder = monitor.forward_to(handle.clone());
    let checker = monitor.spawn_checks(api, Duration::from_secs(check_interval_secs.max(1)));

    let mut sessions = handle.subscribe();
    let mut last_line = format_session_line(&sessions.borrow_and_update());
    println!("{last_line}");
    handle.request_sync(TriggerSource::User);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            changed = sessions.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = format_session_line(&sessions.borrow_and_update());
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
        }
    }

    checker.abort();
    forwarder.abort();
    handle.shutdown();
    if let Err(error) = orchestrator.await {
        tracing::warn!(%error, "Sync orchestrator task ended abnormally");
    }
    Ok(())
}
