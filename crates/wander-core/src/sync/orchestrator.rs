//! Event loop that drives the sync state machine.
//!
//! Triggers arrive over an mpsc channel and the loop is the only place that
//! decides whether a cycle starts, so at most one sync is ever in flight.
//! Every transition is published on a watch channel.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::SyncClientConfig;
use crate::services::QueueStats;
use crate::state::SyncSession;

use super::client::SyncApi;
use super::engine::{CycleOutcome, SyncEngine};
use super::machine::{transition, CooldownPolicy, SyncEffect, SyncEvent, TriggerSource};

/// Pacing of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub cooldown: CooldownPolicy,
    /// Periodic trigger; `None` disables it
    pub sync_interval: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cooldown: CooldownPolicy::default(),
            sync_interval: Some(SyncClientConfig::DEFAULT_INTERVAL),
        }
    }
}

impl From<&SyncClientConfig> for OrchestratorConfig {
    fn from(config: &SyncClientConfig) -> Self {
        Self {
            cooldown: CooldownPolicy {
                success: config.cooldown,
                error_base: config.cooldown.max(Duration::from_millis(100)),
                error_max: config.backoff_max,
            },
            sync_interval: config.sync_interval,
        }
    }
}

enum Command {
    Event(SyncEvent),
    Shutdown,
}

/// Cloneable handle to a running orchestrator
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    session: watch::Receiver<SyncSession>,
}

impl SyncHandle {
    /// Ask for a sync; honored according to the current phase
    pub fn request_sync(&self, source: TriggerSource) {
        self.send(SyncEvent::Trigger(source));
    }

    pub fn set_online(&self, online: bool) {
        self.send(SyncEvent::ConnectivityChanged { online });
    }

    /// Report a new queue depth (after an enqueue, for display)
    pub fn queue_changed(&self, stats: QueueStats) {
        self.send(SyncEvent::QueueChanged {
            pending_count: stats.pending_count,
            max_retry_count: stats.max_retry_count,
        });
    }

    /// Current session
    pub fn session(&self) -> SyncSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSession> {
        self.session.clone()
    }

    /// Wait until the published session satisfies `predicate`.
    ///
    /// Returns `None` once the orchestrator has stopped.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SyncSession) -> bool,
    ) -> Option<SyncSession> {
        let mut receiver = self.session.clone();
        let session = receiver
            .wait_for(|session| predicate(session))
            .await
            .ok()
            .map(|session| session.clone());
        session
    }

    /// Stop the event loop; an in-flight cycle still completes and commits
    pub fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).is_err() {
            tracing::debug!("Sync orchestrator already stopped");
        }
    }

    fn send(&self, event: SyncEvent) {
        if self.commands.send(Command::Event(event)).is_err() {
            tracing::debug!("Sync orchestrator stopped; dropping event");
        }
    }
}

/// Owns the session and performs the effects the state machine asks for
pub struct SyncOrchestrator<A> {
    engine: SyncEngine<A>,
    config: OrchestratorConfig,
    session: SyncSession,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    publisher: watch::Sender<SyncSession>,
    cooldown_timer: Option<JoinHandle<()>>,
}

impl<A: SyncApi> SyncOrchestrator<A> {
    pub fn new(engine: SyncEngine<A>, config: OrchestratorConfig, initial: SyncSession) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (publisher, _) = watch::channel(initial.clone());
        Self {
            engine,
            config,
            session: initial,
            commands_tx,
            commands_rx,
            publisher,
            cooldown_timer: None,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            commands: self.commands_tx.clone(),
            session: self.publisher.subscribe(),
        }
    }

    /// Seed the session from the store and run the loop on a new task
    pub async fn spawn(
        engine: SyncEngine<A>,
        config: OrchestratorConfig,
        is_online: bool,
    ) -> crate::Result<(SyncHandle, JoinHandle<()>)> {
        let stats = engine.store().queue_stats().await?;
        let watermark = engine.store().last_synced_at().await?;
        let initial = SyncSession::new(is_online)
            .with_watermark(watermark)
            .with_queue(stats.pending_count, stats.max_retry_count);

        let orchestrator = Self::new(engine, config, initial);
        let handle = orchestrator.handle();
        let task = tokio::spawn(orchestrator.run());
        Ok((handle, task))
    }

    /// Process events until shut down
    pub async fn run(mut self) {
        let ticker = self.config.sync_interval.map(|period| {
            let commands = self.commands_tx.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let trigger = Command::Event(SyncEvent::Trigger(TriggerSource::Periodic));
                    if commands.send(trigger).is_err() {
                        break;
                    }
                }
            })
        });

        tracing::debug!(session = ?self.session, "Sync orchestrator started");
        while let Some(command) = self.commands_rx.recv().await {
            match command {
                Command::Event(event) => self.handle_event(event).await,
                Command::Shutdown => break,
            }
        }

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        if let Some(timer) = self.cooldown_timer.take() {
            timer.abort();
        }
        tracing::debug!("Sync orchestrator stopped");
    }

    async fn handle_event(&mut self, event: SyncEvent) {
        // Decide on fresh queue numbers whenever the event may start a cycle
        if matches!(
            event,
            SyncEvent::Trigger(_) | SyncEvent::ConnectivityChanged { online: true }
        ) {
            match self.engine.store().queue_stats().await {
                Ok(stats) => self.apply(SyncEvent::QueueChanged {
                    pending_count: stats.pending_count,
                    max_retry_count: stats.max_retry_count,
                }),
                Err(error) => tracing::warn!(%error, "Failed to read queue depth"),
            }
        }
        self.apply(event);
    }

    fn apply(&mut self, event: SyncEvent) {
        let (next, effect) = transition(self.session.clone(), event, &self.config.cooldown);
        if next.phase != self.session.phase {
            tracing::debug!(from = %self.session.phase, to = %next.phase, "Sync phase changed");
        }
        self.session = next;
        self.publisher.send_replace(self.session.clone());
        self.perform(effect);
    }

    fn perform(&mut self, effect: SyncEffect) {
        match effect {
            SyncEffect::None => {}
            SyncEffect::StartSync(source) => {
                tracing::debug!(?source, "Starting sync cycle");
                // A cycle that ends a back-off early leaves its timer behind
                if let Some(timer) = self.cooldown_timer.take() {
                    timer.abort();
                }
                let engine = self.engine.clone();
                let commands = self.commands_tx.clone();
                tokio::spawn(async move {
                    let event = run_cycle_event(&engine).await;
                    if commands.send(Command::Event(event)).is_err() {
                        tracing::debug!("Sync orchestrator stopped before the cycle finished");
                    }
                });
            }
            SyncEffect::ScheduleCooldown(delay) => {
                let commands = self.commands_tx.clone();
                self.cooldown_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // A closed channel means the loop has stopped
                    let _ = commands.send(Command::Event(SyncEvent::CooldownElapsed));
                }));
            }
        }
    }
}

async fn run_cycle_event<A: SyncApi>(engine: &SyncEngine<A>) -> SyncEvent {
    match engine.run_cycle().await {
        Ok(CycleOutcome::Skipped) => SyncEvent::SyncSkipped,
        Ok(CycleOutcome::Synced(report)) => SyncEvent::SyncSucceeded {
            synced_at: report.synced_at,
            pending_count: report.remaining.pending_count,
            max_retry_count: report.remaining.max_retry_count,
        },
        Err(error) => {
            let stats = engine.store().queue_stats().await.unwrap_or_default();
            SyncEvent::SyncFailed {
                error: error.to_string(),
                pending_count: stats.pending_count,
                max_retry_count: stats.max_retry_count,
            }
        }
    }
}
