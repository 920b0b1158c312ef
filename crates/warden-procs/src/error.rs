//! Resource inspector error types.

use thiserror::Error;

pub type InspectResult<T> = Result<T, InspectError>;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("failed to list process table at {path}: {source}")]
    ProcTable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
