//! Mutable monitoring state carried between cycles.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, info};

use warden_health::HealthTracker;
use warden_state::{AuditStore, EpochMillis, RecoveryMarker, Signal, StateResult};

/// Transitions retained for diagnostics.
const TRANSITION_HISTORY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Evaluating,
    RestartInFlight,
    CoolDown,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControllerState::Idle => "idle",
            ControllerState::Evaluating => "evaluating",
            ControllerState::RestartInFlight => "restart-in-flight",
            ControllerState::CoolDown => "cool-down",
        })
    }
}

/// One recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub at_ms: EpochMillis,
    pub from: ControllerState,
    pub to: ControllerState,
}

/// Everything a cycle reads and writes besides the controller's fixed parts.
///
/// Restart bookkeeping and the log cursor are loaded from and written back
/// to the audit store, so a monitor restarted mid cool-down keeps honoring it
/// and successive `once` runs never count the same log entry twice.
#[derive(Debug)]
pub struct MonitorContext {
    state: ControllerState,
    pub last_restart_ms: Option<EpochMillis>,
    pub consecutive_failures: u32,
    pub tracker: HealthTracker,
    /// Newest log entry already counted, in µs. `None` before the first scan
    /// ever made against this audit store.
    pub log_cursor_us: Option<u64>,
    /// Breaches of the cycle in progress, kept for the timeout record.
    pub pending_signals: Vec<Signal>,
    transitions: VecDeque<Transition>,
    audit: AuditStore,
}

impl MonitorContext {
    pub fn new(audit: AuditStore, tracker: HealthTracker) -> StateResult<Self> {
        let marker = audit.load_marker()?;
        let state = if marker.last_restart_ms.is_some() {
            ControllerState::CoolDown
        } else {
            ControllerState::Idle
        };
        if let Some(at) = marker.last_restart_ms {
            info!(
                last_restart_ms = at,
                consecutive_failures = marker.consecutive_failures,
                "restored restart marker"
            );
        }
        Ok(Self {
            state,
            last_restart_ms: marker.last_restart_ms,
            consecutive_failures: marker.consecutive_failures,
            tracker,
            log_cursor_us: marker.log_cursor_us,
            pending_signals: Vec::new(),
            transitions: VecDeque::with_capacity(TRANSITION_HISTORY),
            audit,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn audit(&self) -> &AuditStore {
        &self.audit
    }

    pub fn transition(&mut self, to: ControllerState, at_ms: EpochMillis) {
        if self.state == to {
            return;
        }
        debug!(from = %self.state, %to, "controller state change");
        if self.transitions.len() == TRANSITION_HISTORY {
            self.transitions.pop_front();
        }
        self.transitions.push_back(Transition {
            at_ms,
            from: self.state,
            to,
        });
        self.state = to;
    }

    /// Recent transitions, oldest first.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    /// Milliseconds of cool-down left at `now_ms`, zero when none applies.
    pub fn cooldown_remaining_ms(&self, now_ms: EpochMillis, cooldown_ms: u64) -> u64 {
        match self.last_restart_ms {
            Some(at) => (at + cooldown_ms).saturating_sub(now_ms),
            None => 0,
        }
    }

    pub fn marker(&self) -> RecoveryMarker {
        RecoveryMarker {
            last_restart_ms: self.last_restart_ms,
            consecutive_failures: self.consecutive_failures,
            log_cursor_us: self.log_cursor_us,
        }
    }

    pub fn persist_marker(&self) -> StateResult<()> {
        self.audit.save_marker(&self.marker())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(audit: AuditStore) -> MonitorContext {
        MonitorContext::new(audit, HealthTracker::new(1, 10)).unwrap()
    }

    #[test]
    fn fresh_store_starts_idle() {
        let ctx = context(AuditStore::open_in_memory().unwrap());
        assert_eq!(ctx.state(), ControllerState::Idle);
        assert_eq!(ctx.last_restart_ms, None);
        assert_eq!(ctx.cooldown_remaining_ms(1_000, 300_000), 0);
    }

    #[test]
    fn marker_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.redb");
        {
            let mut ctx = context(AuditStore::open(&path).unwrap());
            ctx.last_restart_ms = Some(10_000);
            ctx.consecutive_failures = 2;
            ctx.log_cursor_us = Some(9_000_000);
            ctx.persist_marker().unwrap();
        }
        let ctx = context(AuditStore::open(&path).unwrap());
        assert_eq!(ctx.log_cursor_us, Some(9_000_000));
        assert_eq!(ctx.state(), ControllerState::CoolDown);
        assert_eq!(ctx.last_restart_ms, Some(10_000));
        assert_eq!(ctx.consecutive_failures, 2);
        assert_eq!(ctx.cooldown_remaining_ms(70_000, 300_000), 240_000);
        assert_eq!(ctx.cooldown_remaining_ms(400_000, 300_000), 0);
    }

    #[test]
    fn cursor_alone_does_not_start_cooldown() {
        let audit = AuditStore::open_in_memory().unwrap();
        audit
            .save_marker(&RecoveryMarker {
                log_cursor_us: Some(1_000),
                ..RecoveryMarker::default()
            })
            .unwrap();
        let ctx = context(audit);
        assert_eq!(ctx.state(), ControllerState::Idle);
        assert_eq!(ctx.log_cursor_us, Some(1_000));
    }

    #[test]
    fn transitions_are_recorded_once() {
        let mut ctx = context(AuditStore::open_in_memory().unwrap());
        ctx.transition(ControllerState::Evaluating, 1);
        ctx.transition(ControllerState::Evaluating, 2);
        ctx.transition(ControllerState::Idle, 3);
        let seen: Vec<_> = ctx.transitions().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            seen,
            vec![
                (ControllerState::Idle, ControllerState::Evaluating),
                (ControllerState::Evaluating, ControllerState::Idle),
            ]
        );
    }

    #[test]
    fn transition_history_is_bounded() {
        let mut ctx = context(AuditStore::open_in_memory().unwrap());
        for i in 0..100 {
            let to = if i % 2 == 0 {
                ControllerState::Evaluating
            } else {
                ControllerState::Idle
            };
            ctx.transition(to, i);
        }
        assert_eq!(ctx.transitions().count(), TRANSITION_HISTORY);
    }
}
