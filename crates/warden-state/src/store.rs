//! AuditStore: redb-backed audit log for recovery decisions.
//!
//! Decisions are append-only. The store also persists the
//! [`RecoveryMarker`] so the cool-down outlives the monitor process. Both
//! on-disk and in-memory backends are supported (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe audit store backed by redb.
#[derive(Clone)]
pub struct AuditStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for AuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditStore").finish_non_exhaustive()
    }
}

impl AuditStore {
    /// Open (or create) a persistent audit store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "audit store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory audit store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory audit store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(AUDIT).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Decisions ──────────────────────────────────────────────────

    /// Append a decision. Returns the key it was stored under.
    pub fn append_decision(&self, decision: &RecoveryDecision) -> StateResult<String> {
        let value = serde_json::to_vec(decision).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let key;
        {
            let mut table = txn.open_table(AUDIT).map_err(map_err!(Table))?;
            // The table length is a per-store sequence: unique even when two
            // decisions share a millisecond.
            let seq = table.len().map_err(map_err!(Read))?;
            key = audit_key(decision.timestamp_ms, seq);
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, outcome = decision.outcome.as_str(), "decision audited");
        Ok(key)
    }

    /// The newest `limit` decisions, newest first.
    pub fn recent_decisions(&self, limit: usize) -> StateResult<Vec<RecoveryDecision>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUDIT).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(map_err!(Read))?;
            let decision: RecoveryDecision =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(decision);
        }
        Ok(results)
    }

    /// All decisions at or after `since_ms`, oldest first.
    pub fn decisions_since(&self, since_ms: EpochMillis) -> StateResult<Vec<RecoveryDecision>> {
        let start = format!("{since_ms:020}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUDIT).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(start.as_str()..).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let decision: RecoveryDecision =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(decision);
        }
        Ok(results)
    }

    /// Number of audited decisions.
    pub fn decision_count(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUDIT).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }

    // ── Marker ─────────────────────────────────────────────────────

    /// Load the persisted marker, or the default if none was saved yet.
    pub fn load_marker(&self) -> StateResult<RecoveryMarker> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(META).map_err(map_err!(Table))?;
        match table.get(MARKER_KEY).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Ok(RecoveryMarker::default()),
        }
    }

    pub fn save_marker(&self, marker: &RecoveryMarker) -> StateResult<()> {
        let value = serde_json::to_vec(marker).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(META).map_err(map_err!(Table))?;
            table
                .insert(MARKER_KEY, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

fn audit_key(timestamp_ms: EpochMillis, seq: u64) -> String {
    format!("{timestamp_ms:020}:{seq:010}")
}
