//! warden-core: configuration shared by every Warden crate.
//!
//! The monitor is driven by a single `warden.toml`. Every section is
//! optional; defaults reproduce the thresholds the currency-exchange
//! deployment has been operated with (port 5001, more than 5 socket
//! errors, 500 MB resident, 1000 descriptors, 30 s polling).

pub mod config;
pub mod duration;
pub mod error;

pub use config::*;
pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
