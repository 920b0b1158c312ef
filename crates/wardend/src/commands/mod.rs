pub mod audit;
pub mod check;
pub mod monitor;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use tracing::{info, warn};

use warden_core::{DEFAULT_CONFIG_PATH, WardenConfig};
use warden_state::AuditStore;

/// Cycle ended `restart-failed` or `cycle-timeout`, or breached with
/// restart attempts exhausted.
pub fn exit_failure() -> ExitCode {
    ExitCode::from(1)
}

/// Config, audit store or health URL unusable.
pub fn exit_setup() -> ExitCode {
    ExitCode::from(2)
}

/// Load and validate the config.
///
/// A missing file at the default location means "all defaults"; a missing
/// file that was asked for explicitly is an error.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<WardenConfig> {
    let config = match path {
        Some(path) => WardenConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                WardenConfig::from_file(default)
                    .with_context(|| format!("loading config from {DEFAULT_CONFIG_PATH}"))?
            } else {
                warn!(path = DEFAULT_CONFIG_PATH, "no config file, using defaults");
                WardenConfig::default()
            }
        }
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

pub fn open_audit(config: &WardenConfig) -> anyhow::Result<AuditStore> {
    let path = &config.monitor.audit_db;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating audit directory {}", parent.display()))?;
    }
    let store = AuditStore::open(path)
        .with_context(|| format!("opening audit store {}", path.display()))?;
    info!(path = %path.display(), "audit store opened");
    Ok(store)
}
