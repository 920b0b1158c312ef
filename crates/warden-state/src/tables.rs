//! redb table definitions for the audit store.

use redb::TableDefinition;

/// Recovery decisions keyed by `{timestamp_ms:020}:{seq:010}`.
pub const AUDIT: TableDefinition<&str, &[u8]> = TableDefinition::new("audit");

/// Singleton records such as the cool-down marker.
pub const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Key of the [`RecoveryMarker`](crate::RecoveryMarker) in `META`.
pub const MARKER_KEY: &str = "recovery_marker";
