//! Serialized session snapshot types.
//!
//! One snapshot blob is persisted per derived storage key (route). Current
//! on-the-wire schema is v3; older blobs are discarded on read, never
//! migrated - the snapshot only ever holds ephemeral unsaved edits.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema tag written into every snapshot. Bump on any incompatible change
/// to [`SessionSnapshot`] or [`EditorSlice`].
pub const SCHEMA_VERSION: &str = "3";

/// Maximum age before a persisted snapshot is treated as absent.
pub const STALENESS_WINDOW_SECS: i64 = 10 * 60;

/// Point-in-time capture of everything on the page worth resurrecting after
/// a tab suspension: per-editor form state plus page-level context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub schema_version: String,
    pub last_active: DateTime<Utc>,
    pub scroll_position: u64,
    #[serde(default)]
    pub editing_section_id: Option<String>,
    /// Last-known copy of the record being edited. Opaque passthrough - the
    /// coordinator never validates or interprets it.
    #[serde(default)]
    pub domain_data: Option<Value>,
    #[serde(default)]
    pub editor_slices: HashMap<String, EditorSlice>,
    #[serde(default)]
    pub unsaved_changes: bool,
}

impl SessionSnapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        SessionSnapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            last_active: now,
            scroll_position: 0,
            editing_section_id: None,
            domain_data: None,
            editor_slices: HashMap::new(),
            unsaved_changes: false,
        }
    }

}

/// The portion of a snapshot owned by one registered editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorSlice {
    pub form_data: Value,
    /// Whether the owning editor was active (mounted and capture-eligible)
    /// when this slice was taken. Only active slices are replayed.
    pub active: bool,
    pub last_modified: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_carries_current_schema() {
        let snap = SessionSnapshot::empty(Utc::now());
        assert_eq!(snap.schema_version, SCHEMA_VERSION);
        assert!(snap.editor_slices.is_empty());
        assert!(!snap.unsaved_changes);
    }

    #[test]
    fn snapshot_deserializes_with_missing_optional_fields() {
        // A v3 blob written before unsaved_changes/domain_data existed.
        let json = format!(
            r#"{{"schema_version":"{}","last_active":"2026-01-01T00:00:00Z","scroll_position":120}}"#,
            SCHEMA_VERSION
        );
        let snap: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap.scroll_position, 120);
        assert!(snap.domain_data.is_none());
        assert!(snap.editor_slices.is_empty());
    }
}
