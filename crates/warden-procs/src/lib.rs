//! warden-procs: resource usage of the managed service's workers.
//!
//! Walks `/proc`, keeps processes whose command line contains every
//! configured substring, and reports resident memory (`VmRSS`) and the
//! number of entries in `fd/`. The inspector is synchronous; async callers
//! run it on the blocking pool.

pub mod error;
pub mod inspector;

pub use error::{InspectError, InspectResult};
pub use inspector::{ProcessMatcher, ResourceInspector};
