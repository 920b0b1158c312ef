//! warden-state: data model and audit log for the Warden monitor.
//!
//! Backed by [redb](https://docs.rs/redb). Every recovery decision is
//! JSON-serialized and appended to the `audit` table under a key that sorts
//! chronologically (`{timestamp_ms:020}:{seq:010}`). The `meta` table holds
//! the cool-down marker so a restarted monitor does not forget its last
//! restart.
//!
//! The `AuditStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::AuditStore;
pub use types::*;
