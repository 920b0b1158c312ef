//! `check-config`.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;

use warden_recovery::RecoveryController;

use super::load_config;

/// Validate the config and wire a controller from it without running a
/// cycle, so an unusable health URL or regex is caught here too.
pub fn check_config(config_path: Option<&Path>, effective: bool) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    RecoveryController::from_config(&config).context("building recovery controller")?;

    if effective {
        print!("{}", config.to_toml_string().context("rendering config")?);
    } else {
        println!("configuration ok (unit {})", config.service.unit);
    }
    Ok(ExitCode::SUCCESS)
}
