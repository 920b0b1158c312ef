//! `audit`: dump recent decisions as JSON lines.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;

use super::{load_config, open_audit};

pub fn print(config_path: Option<&Path>, limit: usize) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    let store = open_audit(&config)?;
    let decisions = store
        .recent_decisions(limit)
        .context("reading audit log")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for decision in &decisions {
        let line = serde_json::to_string(decision)?;
        writeln!(out, "{line}")?;
    }
    Ok(ExitCode::SUCCESS)
}
