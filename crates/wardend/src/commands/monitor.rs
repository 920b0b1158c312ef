//! `once` and `daemon`.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{error, info};

use warden_core::WardenConfig;
use warden_recovery::{MonitorContext, RecoveryController};

use super::{exit_failure, load_config, open_audit};

fn build(config: &WardenConfig) -> anyhow::Result<(RecoveryController, MonitorContext)> {
    let controller =
        RecoveryController::from_config(config).context("building recovery controller")?;
    let ctx = controller.new_context(open_audit(config)?)?;
    Ok((controller, ctx))
}

pub async fn once(config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    let (controller, mut ctx) = build(&config)?;

    let result = controller.run_cycle(&mut ctx).await;
    match result {
        Ok(decision) if controller.is_unresolved(&ctx, &decision) => Ok(exit_failure()),
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %e, "monitoring cycle failed");
            Ok(exit_failure())
        }
    }
}

pub async fn daemon(config_path: Option<&Path>, interval_secs: Option<u64>) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    let interval = match interval_secs {
        Some(secs) => Duration::from_secs(secs.max(1)),
        None => config.monitor.interval()?,
    };
    let (controller, mut ctx) = build(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut interrupt = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        info!(signal = name, "shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    info!(unit = %config.service.unit, "Warden daemon starting");
    controller.run(&mut ctx, interval, shutdown_rx).await;
    info!("Warden daemon stopped");
    Ok(ExitCode::SUCCESS)
}
