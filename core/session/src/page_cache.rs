//! Secondary whole-page persistence layer.
//!
//! Not every piece of page state has a registered editor behind it: the
//! loaded record, which section is expanded, which modals are open, how far
//! the page is scrolled. This layer snapshots that page-level state as one
//! blob, saved on a debounce and on a fixed interval, and restored at most
//! once per mount.
//!
//! It is deliberately independent of the per-editor registry mechanism: its
//! blob lives under its own key suffix, carries its own integer version and
//! its own TTL, and the two never read or overwrite each other's slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::SnapshotStorage;

/// On-the-wire version for the page blob. Only blobs with a matching
/// version are loaded.
pub const PAGE_CACHE_VERSION: u32 = 2;

const PAGE_KEY_SUFFIX: &str = "::page";

/// Page-level state without a registered editor owner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageState {
    /// The record being edited, as last handed over by the host.
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub active_section_id: Option<String>,
    /// Ids of modals open at capture time.
    #[serde(default)]
    pub open_modals: Vec<String>,
    #[serde(default)]
    pub scroll_position: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PageBlob {
    version: u32,
    saved_at: DateTime<Utc>,
    state: PageState,
}

pub(crate) struct PageStateCache {
    key: String,
    ttl: chrono::Duration,
    state: Option<PageState>,
    restored: bool,
}

impl PageStateCache {
    pub(crate) fn new(base_key: &str, ttl: chrono::Duration) -> Self {
        PageStateCache {
            key: format!("{}{}", base_key, PAGE_KEY_SUFFIX),
            ttl,
            state: None,
            restored: false,
        }
    }

    /// Records the latest page state. Persistence happens later, on the
    /// debounce or interval the coordinator drives.
    pub(crate) fn note_change(&mut self, state: PageState) {
        self.state = Some(state);
    }

    pub(crate) fn state(&self) -> Option<&PageState> {
        self.state.as_ref()
    }

    /// Writes the current page state, if any. Best-effort: failures are
    /// logged and swallowed.
    pub(crate) fn save(&mut self, storage: &mut dyn SnapshotStorage, now: DateTime<Utc>) {
        let Some(state) = &self.state else {
            return;
        };

        let blob = PageBlob {
            version: PAGE_CACHE_VERSION,
            saved_at: now,
            state: state.clone(),
        };
        let serialized = match serde_json::to_string(&blob) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!(error = %e, key = %self.key, "failed to serialize page state");
                return;
            }
        };
        if let Err(e) = storage.set(&self.key, &serialized) {
            tracing::warn!(error = %e, key = %self.key, "failed to persist page state");
        }
    }

    /// Loads the persisted page state at most once per mount, provided the
    /// blob's version matches and it is younger than the TTL.
    pub(crate) fn restore_once(
        &mut self,
        storage: &dyn SnapshotStorage,
        now: DateTime<Utc>,
    ) -> Option<PageState> {
        if self.restored {
            return None;
        }
        self.restored = true;

        let blob = storage.get(&self.key)?;
        let blob: PageBlob = match serde_json::from_str(&blob) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, key = %self.key, "discarding malformed page state");
                return None;
            }
        };

        if blob.version != PAGE_CACHE_VERSION {
            tracing::warn!(
                found = blob.version,
                expected = PAGE_CACHE_VERSION,
                key = %self.key,
                "discarding page state with unsupported version"
            );
            return None;
        }
        if now.signed_duration_since(blob.saved_at) > self.ttl {
            tracing::debug!(key = %self.key, saved_at = %blob.saved_at, "ignoring stale page state");
            return None;
        }

        self.state = Some(blob.state.clone());
        Some(blob.state)
    }

    pub(crate) fn clear(&mut self, storage: &mut dyn SnapshotStorage) {
        storage.remove(&self.key);
        self.state = None;
        self.restored = false;
    }
}
