//! Log sources queried by timestamp cutoff.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::error::{LogError, LogResult};
use crate::timestamp;

/// One log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Microseconds since the epoch.
    pub timestamp_us: u64,
    pub message: String,
}

impl LogEntry {
    pub fn new(timestamp_us: u64, message: impl Into<String>) -> Self {
        Self {
            timestamp_us,
            message: message.into(),
        }
    }
}

/// Read-only access to an append-only log stream.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Entries with `timestamp_us > since_us`, oldest first.
    async fn entries_since(&self, since_us: u64) -> LogResult<Vec<LogEntry>>;

    /// Human-readable name for logs.
    fn describe(&self) -> String;
}

// ── journald ──────────────────────────────────────────────────────

/// Reads a systemd unit's journal through `journalctl -o json`.
#[derive(Debug, Clone)]
pub struct JournalSource {
    journalctl: String,
    unit: String,
}

impl JournalSource {
    pub fn new(journalctl: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            journalctl: journalctl.into(),
            unit: unit.into(),
        }
    }
}

#[async_trait]
impl LogSource for JournalSource {
    async fn entries_since(&self, since_us: u64) -> LogResult<Vec<LogEntry>> {
        // journalctl only takes whole seconds; the strict filter below
        // drops what was already seen inside that second.
        let since = format!("@{}", since_us / 1_000_000);
        let output = Command::new(&self.journalctl)
            .args(["-u", &self.unit, "--since", &since, "-o", "json", "--no-pager", "-q"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| LogError::Spawn {
                program: self.journalctl.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(LogError::Command {
                program: self.journalctl.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let entries = parse_journal_json(&stdout, since_us);
        debug!(unit = %self.unit, entries = entries.len(), "journal read");
        Ok(entries)
    }

    fn describe(&self) -> String {
        format!("journal:{}", self.unit)
    }
}

/// Parse `journalctl -o json` output, keeping entries newer than `since_us`.
/// Lines that are not valid journal records are skipped.
pub(crate) fn parse_journal_json(output: &str, since_us: u64) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let record: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "skipping malformed journal line");
                continue;
            }
        };
        let Some(timestamp_us) = record
            .get("__REALTIME_TIMESTAMP")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<u64>().ok())
        else {
            continue;
        };
        if timestamp_us <= since_us {
            continue;
        }
        if let Some(message) = record.get("MESSAGE").and_then(journal_message) {
            entries.push(LogEntry::new(timestamp_us, message));
        }
    }
    entries.sort_by_key(|e| e.timestamp_us);
    entries
}

/// journald emits non-UTF-8 messages as byte arrays.
fn journal_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(bytes) => {
            let raw: Vec<u8> = bytes
                .iter()
                .filter_map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            Some(String::from_utf8_lossy(&raw).into_owned())
        }
        _ => None,
    }
}

// ── text file ─────────────────────────────────────────────────────

/// Reads a plain text log such as Gunicorn's error log.
///
/// The whole file is re-read on every call and filtered by timestamp, so a
/// rotated or truncated file needs no special handling. Gunicorn stamps
/// lines to the second: a line appended after a scan but within the
/// cursor's second is never counted.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LogSource for FileSource {
    async fn entries_since(&self, since_us: u64) -> LogResult<Vec<LogEntry>> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|source| LogError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let text = String::from_utf8_lossy(&content);
        let entries = parse_text_log(&text, since_us);
        debug!(path = ?self.path, entries = entries.len(), "log file read");
        Ok(entries)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Split a text log into entries newer than `since_us`.
///
/// Lines without their own timestamp (tracebacks, wrapped output) inherit
/// the previous line's; lines before the first timestamp are dropped since
/// they cannot be placed relative to the cursor.
pub(crate) fn parse_text_log(text: &str, since_us: u64) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut current: Option<u64> = None;
    for line in text.lines() {
        if let Some(ts) = timestamp::parse_prefix(line) {
            current = Some(ts);
        }
        match current {
            Some(ts) if ts > since_us && !line.trim().is_empty() => {
                entries.push(LogEntry::new(ts, line));
            }
            _ => {}
        }
    }
    entries
}
