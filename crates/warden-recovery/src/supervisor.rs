//! systemd control of the managed service.

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use warden_core::{RestartStrategy, WardenConfig};

use crate::error::{RecoveryError, RecoveryResult};

/// Pause between killing leftover workers and touching their sockets.
const KILL_SETTLE: Duration = Duration::from_secs(2);

/// Start/stop/query seam over the service manager.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Whether the unit is currently active.
    async fn is_active(&self) -> RecoveryResult<bool>;

    /// Issue a restart. Returns once the service manager accepted it; the
    /// caller verifies health separately.
    async fn restart(&self) -> RecoveryResult<()>;

    fn describe(&self) -> String;
}

/// Drives a systemd unit through `systemctl`.
#[derive(Debug, Clone)]
pub struct SystemdSupervisor {
    systemctl: String,
    pkill: String,
    unit: String,
    strategy: RestartStrategy,
    stop_settle: Duration,
    kill_settle: Duration,
    kill_timeout: Duration,
    kill_pattern: Option<String>,
    socket_files: Vec<PathBuf>,
}

impl SystemdSupervisor {
    pub fn from_config(config: &WardenConfig) -> RecoveryResult<Self> {
        Ok(Self {
            systemctl: config.service.systemctl.clone(),
            pkill: "pkill".to_string(),
            unit: config.service.unit.clone(),
            strategy: config.recovery.strategy,
            stop_settle: config.recovery.stop_settle()?,
            kill_settle: KILL_SETTLE,
            kill_timeout: config.recovery.kill_timeout()?,
            kill_pattern: config.recovery.kill_pattern.clone(),
            socket_files: config.service.socket_files.clone(),
        })
    }

    /// Use a different `pkill` binary.
    pub fn with_pkill(mut self, pkill: impl Into<String>) -> Self {
        self.pkill = pkill.into();
        self
    }

    /// Override the pauses taken during a full restart.
    pub fn with_pauses(mut self, stop_settle: Duration, kill_settle: Duration) -> Self {
        self.stop_settle = stop_settle;
        self.kill_settle = kill_settle;
        self
    }

    pub fn strategy(&self) -> RestartStrategy {
        self.strategy
    }

    async fn systemctl(&self, verb: &str) -> RecoveryResult<()> {
        let output = run(&self.systemctl, &[verb, &self.unit]).await?;
        if output.status.success() {
            debug!(unit = %self.unit, verb, "systemctl succeeded");
            Ok(())
        } else {
            Err(command_failed(&self.systemctl, &[verb, &self.unit], &output))
        }
    }

    /// Stop, kill whatever survived, clear stale sockets, start.
    async fn full_restart(&self) -> RecoveryResult<()> {
        info!(unit = %self.unit, "stopping service");
        self.systemctl("stop").await?;
        tokio::time::sleep(self.stop_settle).await;

        if let Some(pattern) = &self.kill_pattern {
            self.kill_leftovers(pattern).await;
            tokio::time::sleep(self.kill_settle).await;
        }

        self.remove_sockets().await;

        info!(unit = %self.unit, "starting service");
        self.systemctl("start").await
    }

    /// `pkill -f`, escalating to SIGKILL if it does not return in time.
    /// Kill failures are logged, never fatal: `start` is what matters.
    async fn kill_leftovers(&self, pattern: &str) {
        let term = tokio::time::timeout(self.kill_timeout, run(&self.pkill, &["-f", pattern])).await;
        match term {
            Ok(Ok(output)) => log_pkill(pattern, &output, "TERM"),
            Ok(Err(e)) => warn!(error = %e, "could not run pkill"),
            Err(_) => {
                warn!(
                    %pattern,
                    timeout_ms = self.kill_timeout.as_millis() as u64,
                    "pkill timed out, escalating to SIGKILL"
                );
                match tokio::time::timeout(self.kill_timeout, run(&self.pkill, &["-9", "-f", pattern])).await {
                    Ok(Ok(output)) => log_pkill(pattern, &output, "KILL"),
                    Ok(Err(e)) => warn!(error = %e, "could not run pkill -9"),
                    Err(_) => warn!(%pattern, "pkill -9 timed out"),
                }
            }
        }
    }

    async fn remove_sockets(&self) {
        for path in &self.socket_files {
            match tokio::fs::remove_file(path).await {
                Ok(()) => info!(path = %path.display(), "removed stale socket"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove socket"),
            }
        }
    }
}

#[async_trait]
impl ServiceControl for SystemdSupervisor {
    async fn is_active(&self) -> RecoveryResult<bool> {
        let output = run(&self.systemctl, &["is-active", &self.unit]).await?;
        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(unit = %self.unit, %state, "unit state");
        Ok(output.status.success())
    }

    async fn restart(&self) -> RecoveryResult<()> {
        match self.strategy {
            RestartStrategy::Restart => {
                info!(unit = %self.unit, "restarting service");
                self.systemctl("restart").await
            }
            RestartStrategy::Full => self.full_restart().await,
        }
    }

    fn describe(&self) -> String {
        format!("systemd unit {}", self.unit)
    }
}

async fn run(program: &str, args: &[&str]) -> RecoveryResult<Output> {
    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| RecoveryError::Spawn {
            program: program.to_string(),
            source,
        })
}

fn command_failed(program: &str, args: &[&str], output: &Output) -> RecoveryError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    RecoveryError::Command {
        command: format!("{program} {}", args.join(" ")),
        detail: if stderr.is_empty() {
            format!("exit status {}", output.status)
        } else {
            stderr
        },
    }
}

/// pkill exits 1 when nothing matched, which is the common case.
fn log_pkill(pattern: &str, output: &Output, signal: &str) {
    match output.status.code() {
        Some(0) => info!(%pattern, signal, "killed leftover workers"),
        Some(1) => debug!(%pattern, "no leftover workers"),
        _ => warn!(%pattern, status = %output.status, "pkill failed"),
    }
}
