//! Snapshot (de)serialization against a keyed storage slot.
//!
//! Persistence here is strictly best-effort: the page must keep working when
//! storage is full, the blob is garbage, or the schema moved on. Concretely:
//!
//! - Write failures (serialization, quota) are logged and swallowed - they
//!   never propagate into caller code.
//! - Malformed blobs parse to "absent", not to an error.
//! - Version mismatches and stale blobs are discarded on read.
//!
//! Keys are derived from the current route path so snapshots never leak
//! across unrelated views.

use chrono::{DateTime, Utc};

use crate::storage::SnapshotStorage;

use super::types::{SessionSnapshot, SCHEMA_VERSION};

/// Derives the storage key for a route. The secondary page-state layer
/// appends its own suffix to this so the two mechanisms never collide.
pub(crate) fn storage_key(prefix: &str, route: &str) -> String {
    format!("{}{}", prefix, route)
}

/// Serializes and stores `snapshot` under `key`. Never fails from the
/// caller's point of view.
pub(crate) fn write(storage: &mut dyn SnapshotStorage, key: &str, snapshot: &SessionSnapshot) {
    let blob = match serde_json::to_string(snapshot) {
        Ok(blob) => blob,
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "failed to serialize session snapshot");
            return;
        }
    };

    if let Err(e) = storage.set(key, &blob) {
        tracing::warn!(error = %e, key = %key, "failed to persist session snapshot");
    }
}

/// Reads the snapshot stored under `key`, or `None` when it is absent,
/// malformed, version-mismatched, or older than `ttl`.
pub(crate) fn read(
    storage: &dyn SnapshotStorage,
    key: &str,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
) -> Option<SessionSnapshot> {
    let blob = storage.get(key)?;

    let snapshot: SessionSnapshot = match serde_json::from_str(&blob) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "discarding malformed session snapshot");
            return None;
        }
    };

    if snapshot.schema_version != SCHEMA_VERSION {
        tracing::warn!(
            found = %snapshot.schema_version,
            expected = %SCHEMA_VERSION,
            key = %key,
            "discarding session snapshot with unsupported schema"
        );
        return None;
    }

    if now.signed_duration_since(snapshot.last_active) > ttl {
        tracing::debug!(
            key = %key,
            last_active = %snapshot.last_active,
            "ignoring stale session snapshot"
        );
        return None;
    }

    Some(snapshot)
}
