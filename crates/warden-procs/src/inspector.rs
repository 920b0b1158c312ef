//! `/proc` walker.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use warden_state::{ResourceSnapshot, epoch_millis};

use crate::error::{InspectError, InspectResult};

/// Selects worker processes by command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMatcher {
    /// Every substring must appear in the space-joined command line.
    all_of: Vec<String>,
}

impl ProcessMatcher {
    pub fn new<I, S>(substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all_of: substrings
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, cmdline: &str) -> bool {
        !self.all_of.is_empty() && self.all_of.iter().all(|s| cmdline.contains(s.as_str()))
    }
}

/// Reads per-process resource usage from a proc filesystem.
#[derive(Debug, Clone)]
pub struct ResourceInspector {
    proc_root: PathBuf,
    /// Never report this pid (the monitor itself).
    exclude_pid: Option<u32>,
}

impl ResourceInspector {
    /// Inspector over `proc_root` that skips the current process.
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            exclude_pid: Some(std::process::id()),
        }
    }

    pub fn with_excluded_pid(mut self, pid: Option<u32>) -> Self {
        self.exclude_pid = pid;
        self
    }

    /// Snapshot every process accepted by `matcher`, ordered by pid.
    ///
    /// Processes that exit or deny access mid-walk are skipped. Only a
    /// failure to list the proc root itself is an error.
    pub fn inspect(&self, matcher: &ProcessMatcher) -> InspectResult<Vec<ResourceSnapshot>> {
        let entries = fs::read_dir(&self.proc_root).map_err(|source| InspectError::ProcTable {
            path: self.proc_root.display().to_string(),
            source,
        })?;

        let timestamp_ms = epoch_millis();
        let mut snapshots = Vec::new();

        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            if Some(pid) == self.exclude_pid {
                continue;
            }
            let dir = entry.path();
            let Some(cmdline) = read_cmdline(&dir) else {
                continue;
            };
            if !matcher.matches(&cmdline) {
                continue;
            }
            let Some(resident_kb) = read_vm_rss_kb(&dir) else {
                debug!(pid, "process vanished or status unreadable");
                continue;
            };
            let open_fds = count_fds(&dir);
            if open_fds.is_none() {
                debug!(pid, "fd table unreadable");
            }
            snapshots.push(ResourceSnapshot {
                pid,
                resident_mb: resident_kb as f64 / 1024.0,
                open_fds,
                timestamp_ms,
            });
        }

        snapshots.sort_by_key(|s| s.pid);
        debug!(matched = snapshots.len(), "process table inspected");
        Ok(snapshots)
    }
}

/// NUL-separated argv joined with spaces. Kernel threads have none.
fn read_cmdline(dir: &Path) -> Option<String> {
    let raw = fs::read(dir.join("cmdline")).ok()?;
    let joined = raw
        .split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

/// `VmRSS` from `status`, in kB. Zombies have no `VmRSS` line and report 0.
fn read_vm_rss_kb(dir: &Path) -> Option<u64> {
    let status = fs::read_to_string(dir.join("status")).ok()?;
    Some(parse_vm_rss_kb(&status).unwrap_or(0))
}

fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

/// Entries in `fd/`. Reading another user's table needs privileges.
fn count_fds(dir: &Path) -> Option<u64> {
    match fs::read_dir(dir.join("fd")) {
        Ok(entries) => Some(entries.flatten().count() as u64),
        Err(e) => {
            if e.kind() != ErrorKind::PermissionDenied {
                debug!(error = %e, dir = ?dir, "fd listing failed");
            }
            None
        }
    }
}
