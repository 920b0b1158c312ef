//! Health checker error types.

use thiserror::Error;

pub type HealthResult<T> = Result<T, HealthError>;

/// The probe could not be executed at all.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("invalid health url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported scheme {0:?} (only http is probed)")]
    UnsupportedScheme(String),
}
