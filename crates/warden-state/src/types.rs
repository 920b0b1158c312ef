//! Domain types observed and recorded by the monitor.
//!
//! Samples and snapshots are recomputed every cycle and never persisted on
//! their own; only [`RecoveryDecision`]s and the [`RecoveryMarker`] reach
//! the audit store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds since the unix epoch.
pub type EpochMillis = u64;

// ── Health ────────────────────────────────────────────────────────

/// Outcome of one health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// 2xx response.
    Up,
    /// Connection error or non-2xx response.
    Down,
    /// No response within the probe timeout.
    Timeout,
}

/// A single health probe result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSample {
    pub timestamp_ms: EpochMillis,
    pub endpoint: String,
    pub status: HealthStatus,
    /// HTTP status code, when a response arrived.
    pub code: Option<u16>,
    pub latency_ms: u64,
}

impl HealthSample {
    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

// ── Logs ──────────────────────────────────────────────────────────

/// Matches of one error category inside a scanned log window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub category: String,
    pub count: u64,
}

// ── Processes ─────────────────────────────────────────────────────

/// Resource usage of one worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub pid: u32,
    pub resident_mb: f64,
    /// `None` when the fd table is unreadable (monitor lacks permission).
    pub open_fds: Option<u64>,
    pub timestamp_ms: EpochMillis,
}

// ── Decisions ─────────────────────────────────────────────────────

/// A signal that crossed its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "kebab-case")]
pub enum Signal {
    HealthDown { code: Option<u16> },
    HealthTimeout,
    ErrorCount { category: String, count: u64, limit: u64 },
    Memory { pid: u32, resident_mb: f64, limit_mb: u64 },
    Descriptors { pid: u32, count: u64, limit: u64 },
    NoProcesses,
    ServiceInactive,
    PortClosed,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::HealthDown { code: Some(code) } => write!(f, "health-down({code})"),
            Signal::HealthDown { code: None } => f.write_str("health-down"),
            Signal::HealthTimeout => f.write_str("health-timeout"),
            Signal::ErrorCount {
                category,
                count,
                limit,
            } => write!(f, "error-count[{category}]={count}>{limit}"),
            Signal::Memory {
                pid,
                resident_mb,
                limit_mb,
            } => write!(f, "memory[{pid}]={resident_mb:.1}MB>{limit_mb}MB"),
            Signal::Descriptors { pid, count, limit } => {
                write!(f, "descriptors[{pid}]={count}>{limit}")
            }
            Signal::NoProcesses => f.write_str("no-processes"),
            Signal::ServiceInactive => f.write_str("service-inactive"),
            Signal::PortClosed => f.write_str("port-closed"),
        }
    }
}

/// Join signals into one log-friendly string.
pub fn describe_signals(signals: &[Signal]) -> String {
    if signals.is_empty() {
        return "none".to_string();
    }
    signals
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// What a cycle ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionOutcome {
    NoAction,
    RestartTriggered,
    RestartFailed,
    /// The cycle exceeded its maximum duration and was abandoned.
    CycleTimeout,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::NoAction => "no-action",
            DecisionOutcome::RestartTriggered => "restart-triggered",
            DecisionOutcome::RestartFailed => "restart-failed",
            DecisionOutcome::CycleTimeout => "cycle-timeout",
        }
    }

    /// Outcomes that make a run-once invocation exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DecisionOutcome::RestartFailed | DecisionOutcome::CycleTimeout
        )
    }
}

/// One audited controller decision. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryDecision {
    pub timestamp_ms: EpochMillis,
    pub outcome: DecisionOutcome,
    pub signals: Vec<Signal>,
    pub note: Option<String>,
}

impl RecoveryDecision {
    pub fn new(timestamp_ms: EpochMillis, outcome: DecisionOutcome, signals: Vec<Signal>) -> Self {
        Self {
            timestamp_ms,
            outcome,
            signals,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Persisted restart bookkeeping that must survive a monitor restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMarker {
    /// When the last restart was issued.
    pub last_restart_ms: Option<EpochMillis>,
    /// Restarts in a row that ended `restart-failed`.
    pub consecutive_failures: u32,
    /// Newest log entry already counted, in µs since the epoch.
    #[serde(default)]
    pub log_cursor_us: Option<u64>,
}

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_millis() -> EpochMillis {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as EpochMillis
}
