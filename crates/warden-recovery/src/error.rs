//! Recovery controller error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("config error: {0}")]
    Config(#[from] warden_core::ConfigError),

    #[error("audit store error: {0}")]
    State(#[from] warden_state::StateError),

    #[error("health check cannot execute: {0}")]
    Health(#[from] warden_health::HealthError),

    #[error("log scanner error: {0}")]
    Log(#[from] warden_logscan::LogError),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {detail}")]
    Command { command: String, detail: String },
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;
