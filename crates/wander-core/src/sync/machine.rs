//! Orchestrator transitions.
//!
//! `transition` never performs I/O: the driver feeds it events and carries
//! out the returned effect.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::state::{SyncPhase, SyncSession};

/// Why a sync was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerSource {
    /// Connectivity came back
    Reconnected,
    /// Explicit user refresh
    User,
    /// Background-sync wake-up
    Background,
    /// Periodic tick
    Periodic,
    /// A trigger that arrived during the cool-down
    Deferred,
}

impl TriggerSource {
    /// Triggers that cut an error back-off short
    pub const fn ends_backoff(self) -> bool {
        matches!(self, Self::Reconnected | Self::User)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    ConnectivityChanged { online: bool },
    Trigger(TriggerSource),
    /// Queue depth observed outside of a cycle
    QueueChanged {
        pending_count: usize,
        max_retry_count: u32,
    },
    SyncSucceeded {
        synced_at: DateTime<Utc>,
        pending_count: usize,
        max_retry_count: u32,
    },
    SyncFailed {
        error: String,
        pending_count: usize,
        max_retry_count: u32,
    },
    /// The snapshot was empty when the cycle started
    SyncSkipped,
    CooldownElapsed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncEffect {
    None,
    StartSync(TriggerSource),
    ScheduleCooldown(Duration),
}

/// Rest periods between cycles
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub success: Duration,
    /// Error cool-down before any retry counter has grown
    pub error_base: Duration,
    pub error_max: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            success: Duration::from_millis(1_500),
            error_base: Duration::from_millis(1_500),
            error_max: Duration::from_secs(300),
        }
    }
}

impl CooldownPolicy {
    /// `error_base * 2^retries`, capped at `error_max`
    pub fn error_cooldown(&self, max_retry_count: u32) -> Duration {
        let factor = 1_u32 << max_retry_count.min(16);
        self.error_base.saturating_mul(factor).min(self.error_max)
    }
}

/// Apply one event to the session
pub fn transition(
    session: SyncSession,
    event: SyncEvent,
    policy: &CooldownPolicy,
) -> (SyncSession, SyncEffect) {
    let mut next = session;
    match event {
        SyncEvent::ConnectivityChanged { online } => {
            let reconnected = online && !next.is_online;
            next.is_online = online;
            if reconnected {
                return transition(next, SyncEvent::Trigger(TriggerSource::Reconnected), policy);
            }
            (next, SyncEffect::None)
        }
        SyncEvent::Trigger(source) => {
            if !next.is_online {
                tracing::debug!(?source, "Ignoring sync trigger while offline");
                return (next, SyncEffect::None);
            }
            match next.phase {
                SyncPhase::Syncing => {
                    tracing::debug!(?source, "Dropping sync trigger; a sync is in flight");
                    (next, SyncEffect::None)
                }
                SyncPhase::Error if source.ends_backoff() => {
                    tracing::debug!(?source, "Ending error cool-down early");
                    next.phase = SyncPhase::Idle;
                    next.pending_trigger = false;
                    start(next, source)
                }
                SyncPhase::Success | SyncPhase::Error => {
                    next.pending_trigger = true;
                    (next, SyncEffect::None)
                }
                SyncPhase::Idle => start(next, source),
            }
        }
        SyncEvent::QueueChanged {
            pending_count,
            max_retry_count,
        } => {
            next.pending_count = pending_count;
            next.max_retry_count = max_retry_count;
            (next, SyncEffect::None)
        }
        SyncEvent::SyncSucceeded {
            synced_at,
            pending_count,
            max_retry_count,
        } => {
            next.phase = SyncPhase::Success;
            next.last_synced_at = Some(synced_at);
            next.last_error = None;
            next.pending_count = pending_count;
            next.max_retry_count = max_retry_count;
            (next, SyncEffect::ScheduleCooldown(policy.success))
        }
        SyncEvent::SyncFailed {
            error,
            pending_count,
            max_retry_count,
        } => {
            next.phase = SyncPhase::Error;
            next.last_error = Some(error);
            next.pending_count = pending_count;
            next.max_retry_count = max_retry_count;
            let cooldown = policy.error_cooldown(max_retry_count);
            (next, SyncEffect::ScheduleCooldown(cooldown))
        }
        SyncEvent::SyncSkipped => {
            next.phase = SyncPhase::Idle;
            next.pending_count = 0;
            next.max_retry_count = 0;
            (next, SyncEffect::None)
        }
        SyncEvent::CooldownElapsed => {
            if !next.phase.is_cooling_down() {
                return (next, SyncEffect::None);
            }
            next.phase = SyncPhase::Idle;
            if std::mem::take(&mut next.pending_trigger) && next.is_online {
                return start(next, TriggerSource::Deferred);
            }
            (next, SyncEffect::None)
        }
    }
}

fn start(mut session: SyncSession, source: TriggerSource) -> (SyncSession, SyncEffect) {
    if session.pending_count == 0 {
        tracing::debug!(?source, "Queue empty; nothing to sync");
        return (session, SyncEffect::None);
    }
    session.phase = SyncPhase::Syncing;
    (session, SyncEffect::StartSync(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn policy() -> CooldownPolicy {
        CooldownPolicy {
            success: Duration::from_millis(100),
            error_base: Duration::from_millis(100),
            error_max: Duration::from_secs(1),
        }
    }

    fn online_with(pending: usize) -> SyncSession {
        SyncSession::new(true).with_queue(pending, 0)
    }

    fn step(session: SyncSession, event: SyncEvent) -> (SyncSession, SyncEffect) {
        transition(session, event, &policy())
    }

    #[test]
    fn trigger_while_idle_starts_sync() {
        let (session, effect) = step(online_with(2), SyncEvent::Trigger(TriggerSource::User));
        assert_eq!(session.phase, SyncPhase::Syncing);
        assert_eq!(effect, SyncEffect::StartSync(TriggerSource::User));
    }

    #[test]
    fn trigger_with_empty_queue_stays_idle() {
        let (session, effect) = step(online_with(0), SyncEvent::Trigger(TriggerSource::User));
        assert_eq!(session.phase, SyncPhase::Idle);
        assert_eq!(effect, SyncEffect::None);
    }

    #[test]
    fn trigger_while_syncing_is_dropped() {
        let (syncing, _) = step(online_with(1), SyncEvent::Trigger(TriggerSource::User));
        let periodic = SyncEvent::Trigger(TriggerSource::Periodic);
        let (session, effect) = step(syncing.clone(), periodic);
        assert_eq!(session, syncing);
        assert_eq!(effect, SyncEffect::None);
    }

    #[test]
    fn trigger_while_offline_is_ignored() {
        let offline = SyncSession::new(false).with_queue(3, 0);
        let (session, effect) = step(offline.clone(), SyncEvent::Trigger(TriggerSource::User));
        assert_eq!(session, offline);
        assert_eq!(effect, SyncEffect::None);
    }

    #[test]
    fn reconnect_triggers_sync() {
        let offline = SyncSession::new(false).with_queue(1, 0);
        let (session, effect) = step(offline, SyncEvent::ConnectivityChanged { online: true });
        assert!(session.is_online);
        assert_eq!(effect, SyncEffect::StartSync(TriggerSource::Reconnected));
    }

    #[test]
    fn going_offline_does_not_trigger() {
        let (session, effect) = step(
            online_with(1),
            SyncEvent::ConnectivityChanged { online: false },
        );
        assert!(!session.is_online);
        assert_eq!(session.phase, SyncPhase::Idle);
        assert_eq!(effect, SyncEffect::None);
    }

    #[test]
    fn success_records_watermark_and_cools_down() {
        let synced_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let (syncing, _) = step(online_with(1), SyncEvent::Trigger(TriggerSource::User));
        let (session, effect) = step(
            syncing,
            SyncEvent::SyncSucceeded {
                synced_at,
                pending_count: 0,
                max_retry_count: 0,
            },
        );
        assert_eq!(session.phase, SyncPhase::Success);
        assert_eq!(session.last_synced_at, Some(synced_at));
        assert_eq!(session.pending_count, 0);
        assert_eq!(
            effect,
            SyncEffect::ScheduleCooldown(Duration::from_millis(100))
        );

        let (session, effect) = step(session, SyncEvent::CooldownElapsed);
        assert_eq!(session.phase, SyncPhase::Idle);
        assert_eq!(effect, SyncEffect::None);
    }

    #[test]
    fn failure_backs_off_by_retry_count() {
        let (syncing, _) = step(online_with(1), SyncEvent::Trigger(TriggerSource::User));
        let (session, effect) = step(
            syncing,
            SyncEvent::SyncFailed {
                error: "HTTP 503".into(),
                pending_count: 1,
                max_retry_count: 2,
            },
        );
        assert_eq!(session.phase, SyncPhase::Error);
        assert_eq!(session.last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(
            effect,
            SyncEffect::ScheduleCooldown(Duration::from_millis(400))
        );
    }

    #[test]
    fn error_cooldown_is_capped() {
        let policy = policy();
        assert_eq!(policy.error_cooldown(0), Duration::from_millis(100));
        assert_eq!(policy.error_cooldown(3), Duration::from_millis(800));
        assert_eq!(policy.error_cooldown(10), Duration::from_secs(1));
        assert_eq!(policy.error_cooldown(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn trigger_during_cooldown_runs_once_afterwards() {
        let (syncing, _) = step(online_with(1), SyncEvent::Trigger(TriggerSource::User));
        let (cooling, _) = step(
            syncing,
            SyncEvent::SyncFailed {
                error: "timeout".into(),
                pending_count: 1,
                max_retry_count: 1,
            },
        );

        let (cooling, effect) = step(cooling, SyncEvent::Trigger(TriggerSource::Background));
        assert!(cooling.pending_trigger);
        assert_eq!(effect, SyncEffect::None);
        let (cooling, _) = step(cooling, SyncEvent::Trigger(TriggerSource::Periodic));

        let (session, effect) = step(cooling, SyncEvent::CooldownElapsed);
        assert_eq!(session.phase, SyncPhase::Syncing);
        assert!(!session.pending_trigger);
        assert_eq!(effect, SyncEffect::StartSync(TriggerSource::Deferred));
    }

    fn failed_after_retries(retries: u32) -> SyncSession {
        let (syncing, _) = step(online_with(1), SyncEvent::Trigger(TriggerSource::User));
        let (session, _) = transition(
            syncing,
            SyncEvent::SyncFailed {
                error: "HTTP 503".into(),
                pending_count: 1,
                max_retry_count: retries,
            },
            &CooldownPolicy::default(),
        );
        session
    }

    #[test]
    fn reconnect_cuts_long_error_backoff_short() {
        assert_eq!(
            CooldownPolicy::default().error_cooldown(9),
            Duration::from_secs(300)
        );
        let mut session = failed_after_retries(9);
        session.is_online = false;

        let (session, effect) = transition(
            session,
            SyncEvent::ConnectivityChanged { online: true },
            &CooldownPolicy::default(),
        );
        assert_eq!(session.phase, SyncPhase::Syncing);
        assert!(!session.pending_trigger);
        assert_eq!(effect, SyncEffect::StartSync(TriggerSource::Reconnected));
    }

    #[test]
    fn user_refresh_cuts_error_backoff_short() {
        let (session, effect) = transition(
            failed_after_retries(9),
            SyncEvent::Trigger(TriggerSource::User),
            &CooldownPolicy::default(),
        );
        assert_eq!(session.phase, SyncPhase::Syncing);
        assert_eq!(effect, SyncEffect::StartSync(TriggerSource::User));
    }

    #[test]
    fn periodic_and_background_wait_out_error_backoff() {
        for source in [TriggerSource::Periodic, TriggerSource::Background] {
            let (session, effect) = transition(
                failed_after_retries(9),
                SyncEvent::Trigger(source),
                &CooldownPolicy::default(),
            );
            assert_eq!(session.phase, SyncPhase::Error);
            assert!(session.pending_trigger);
            assert_eq!(effect, SyncEffect::None);
        }
    }

    #[test]
    fn user_refresh_after_error_with_empty_queue_goes_idle() {
        let mut session = failed_after_retries(2);
        session.pending_count = 0;
        let (session, effect) = step(session, SyncEvent::Trigger(TriggerSource::User));
        assert_eq!(session.phase, SyncPhase::Idle);
        assert_eq!(effect, SyncEffect::None);
    }

    #[test]
    fn stale_cooldown_timer_is_ignored() {
        let idle = online_with(1);
        let (session, effect) = step(idle.clone(), SyncEvent::CooldownElapsed);
        assert_eq!(session, idle);
        assert_eq!(effect, SyncEffect::None);
    }

    #[test]
    fn skipped_cycle_returns_to_idle() {
        let (syncing, _) = step(online_with(1), SyncEvent::Trigger(TriggerSource::User));
        let (session, effect) = step(syncing, SyncEvent::SyncSkipped);
        assert_eq!(session.phase, SyncPhase::Idle);
        assert_eq!(session.pending_count, 0);
        assert_eq!(effect, SyncEffect::None);
    }
}
