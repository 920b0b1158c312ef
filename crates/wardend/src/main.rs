//! wardend: the Warden monitor daemon.
//!
//! Watches one systemd-managed web service: probes its health endpoint,
//! counts socket errors in its logs, inspects its workers in `/proc`, and
//! restarts it when any signal breaches its threshold. Every decision is
//! appended to a redb audit log.
//!
//! # Usage
//!
//! ```text
//! wardend once                      # one cycle, exit code reflects outcome
//! wardend daemon --interval 30      # poll until SIGINT/SIGTERM
//! wardend audit --limit 20          # recent decisions as JSON lines
//! wardend check-config              # validate /etc/warden/warden.toml
//! ```
//!
//! Exit codes: 0 clean run, 1 restart failed, cycle timed out or restart
//! attempts exhausted, 2 setup failure (unreadable config, invalid health
//! URL, audit store).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

const DEFAULT_LOG_FILTER: &str = "info,wardend=debug,warden=debug";

#[derive(Parser)]
#[command(name = "wardend", about = "Warden service monitor", version)]
struct Cli {
    /// Path to warden.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single monitoring cycle and exit.
    Once,
    /// Monitor continuously until interrupted.
    Daemon {
        /// Seconds between cycles (overrides monitor.interval).
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Print recent recovery decisions, newest first.
    Audit {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Validate the configuration and exit.
    CheckConfig {
        /// Also print the effective configuration.
        #[arg(long)]
        effective: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let result = match cli.command {
        Command::Once => commands::monitor::once(cli.config.as_deref()).await,
        Command::Daemon { interval } => {
            commands::monitor::daemon(cli.config.as_deref(), interval).await
        }
        Command::Audit { limit } => commands::audit::print(cli.config.as_deref(), limit),
        Command::CheckConfig { effective } => {
            commands::check::check_config(cli.config.as_deref(), effective)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "wardend failed");
            commands::exit_setup()
        }
    }
}

/// Logs go to stderr so `audit` output on stdout stays machine-readable.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
