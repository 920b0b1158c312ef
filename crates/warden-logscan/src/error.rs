//! Log scanner error types.

use thiserror::Error;

pub type LogResult<T> = Result<T, LogError>;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern for category {name:?}: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}
