//! warden-logscan: counts error signatures in recent log output.
//!
//! A [`LogSource`] yields entries newer than a cursor (microseconds since
//! the epoch). The [`LogErrorScanner`] matches each entry against the
//! configured categories and returns per-category totals plus the advanced
//! cursor. Feeding the cursor back into the next scan guarantees an entry
//! is never counted twice.
//!
//! An unavailable source is not an error for the caller: the scan comes
//! back all-zero with `available = false` and the cursor untouched.

pub mod error;
pub mod scanner;
pub mod source;
pub mod timestamp;

pub use error::{LogError, LogResult};
pub use scanner::{CategoryMatcher, LogErrorScanner, ScanReport};
pub use source::{FileSource, JournalSource, LogEntry, LogSource};
