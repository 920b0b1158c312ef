//! warden-health: liveness probes for the supervised service.
//!
//! ```text
//! check(url, timeout)  → HealthSample { up | down | timeout, code, latency }
//! port_open(addr)      → bool (bare TCP connect)
//! HealthTracker        → consecutive non-up samples, bounded history
//! ```
//!
//! A connection error or non-2xx response is `down`; a probe that does not
//! finish inside its timeout is `timeout`, kept distinct so policy can weigh
//! the two differently. Only an unusable URL is an error.

pub mod checker;
pub mod error;
pub mod probe;
pub mod tracker;

pub use checker::{check, port_open};
pub use error::{HealthError, HealthResult};
pub use probe::{HealthProbe, HttpProbe};
pub use tracker::HealthTracker;
