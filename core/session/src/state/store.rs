//! Canonical in-memory session snapshot and its persistence driver.
//!
//! The store owns three things: the editor registry, the live page-level
//! context (scroll offset, editing section, domain payload), and the last
//! snapshot it has seen. `store()` folds the live state and every active
//! editor's slice onto that snapshot and persists it; `restore()` replays a
//! persisted snapshot back through the registrations, at most once per page
//! instance.
//!
//! # Restore Guard
//!
//! A mount-time restore and a visibility-triggered restore can fire in close
//! succession. The one-shot `restored` flag makes the second attempt a
//! no-op, so replay side effects apply at most once per page instance.
//!
//! # Slice Survival
//!
//! `store()` starts from the previous snapshot, so slices belonging to
//! editors that are currently unmounted (or whose capture just failed)
//! survive until `clear()` or staleness removes them. Unregistering captures
//! one final slice, marked inactive, so a remounted editor can still read
//! its last values without being auto-restored.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::lifecycle::ReloadClassification;
use crate::storage::SnapshotStorage;

use super::codec;
use super::types::{EditorSlice, SessionSnapshot, SCHEMA_VERSION};
use super::registry::EditorRegistry;

/// One-shot field overrides applied ahead of a capture. Fields left `None`
/// keep the coordinator's current view.
#[derive(Debug, Clone, Default)]
pub struct SnapshotOverrides {
    pub scroll_position: Option<u64>,
    pub unsaved_changes: Option<bool>,
    pub domain_data: Option<Value>,
}

pub struct SnapshotStore {
    key: String,
    ttl: chrono::Duration,
    registry: EditorRegistry,
    current: Option<SessionSnapshot>,
    restored: bool,
    scroll_position: u64,
    editing_section_id: Option<String>,
    domain_data: Option<Value>,
    unsaved_changes: bool,
}

impl SnapshotStore {
    pub fn new(key: String, ttl: chrono::Duration) -> Self {
        SnapshotStore {
            key,
            ttl,
            registry: EditorRegistry::new(),
            current: None,
            restored: false,
            scroll_position: 0,
            editing_section_id: None,
            domain_data: None,
            unsaved_changes: false,
        }
    }

    /// Inserts or replaces the registration for `id`. Returns true when a
    /// slice for this editor was active at capture time and should be
    /// replayed to it as a deferred catch-up (editors that mount after the
    /// page-level restore already ran).
    pub fn register<T, G, S>(&mut self, id: impl Into<String>, get: G, set: S) -> bool
    where
        T: Serialize + DeserializeOwned,
        G: Fn() -> T + 'static,
        S: FnMut(T) + 'static,
    {
        let id = id.into();
        self.registry.register(id.clone(), get, set);
        self.current
            .as_ref()
            .and_then(|snap| snap.editor_slices.get(&id))
            .map(|slice| slice.active)
            .unwrap_or(false)
    }

    pub fn set_active(&mut self, id: &str, active: bool) {
        self.registry.set_active(id, active);
    }

    /// Removes the registration, capturing a final inactive slice first so
    /// the values remain visible to a later remount of the same id.
    pub fn unregister(&mut self, id: &str, now: DateTime<Utc>) {
        let Some(entry) = self.registry.remove(id) else {
            return;
        };

        let snapshot = self
            .current
            .get_or_insert_with(|| SessionSnapshot::empty(now));

        match (entry.get_state)() {
            Ok(form_data) => {
                let last_modified = match snapshot.editor_slices.get(id) {
                    Some(prev) if prev.form_data == form_data => prev.last_modified,
                    _ => now,
                };
                snapshot.editor_slices.insert(
                    id.to_string(),
                    EditorSlice {
                        form_data,
                        active: false,
                        last_modified,
                    },
                );
            }
            Err(e) => {
                tracing::warn!(editor = %id, error = %e, "final capture failed on unregister");
                // Still retire the slice so it is no longer restore-eligible.
                if let Some(slice) = snapshot.editor_slices.get_mut(id) {
                    slice.active = false;
                }
            }
        }
    }

    pub fn update_scroll_position(&mut self, offset: u64) {
        self.scroll_position = offset;
    }

    pub fn update_editing_section(&mut self, section_id: Option<String>) {
        self.editing_section_id = section_id;
    }

    pub fn editing_section(&self) -> Option<String> {
        self.editing_section_id.clone()
    }

    pub fn update_domain_data(&mut self, data: Value) {
        self.domain_data = Some(data);
    }

    pub fn unsaved_changes(&self) -> bool {
        self.unsaved_changes
    }

    /// The canonical in-memory snapshot, if one exists yet.
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.current.as_ref()
    }

    /// Captures the current page and editor state and persists it.
    ///
    /// The capture starts from the last known snapshot (falling back to the
    /// persisted one, then to empty), so slices owned by editors that are
    /// not currently active carry over instead of being dropped.
    pub fn store(
        &mut self,
        storage: &mut dyn SnapshotStorage,
        now: DateTime<Utc>,
        extra: Option<SnapshotOverrides>,
    ) {
        if let Some(extra) = extra {
            if let Some(scroll) = extra.scroll_position {
                self.scroll_position = scroll;
            }
            if let Some(unsaved) = extra.unsaved_changes {
                self.unsaved_changes = unsaved;
            }
            if let Some(domain) = extra.domain_data {
                self.domain_data = Some(domain);
            }
        }

        let mut snapshot = match self.current.take() {
            Some(current) => current,
            None => codec::read(storage, &self.key, now, self.ttl)
                .unwrap_or_else(|| SessionSnapshot::empty(now)),
        };

        snapshot.schema_version = SCHEMA_VERSION.to_string();
        snapshot.last_active = now;
        snapshot.scroll_position = self.scroll_position;
        snapshot.editing_section_id = self.editing_section_id.clone();
        snapshot.unsaved_changes = self.unsaved_changes;
        // Domain data is a passthrough: only overwrite once the host has
        // actually supplied one.
        if self.domain_data.is_some() {
            snapshot.domain_data = self.domain_data.clone();
        }

        for (id, entry) in self.registry.iter_active() {
            match (entry.get_state)() {
                Ok(form_data) => {
                    let last_modified = match snapshot.editor_slices.get(id) {
                        Some(prev) if prev.form_data == form_data => prev.last_modified,
                        _ => now,
                    };
                    snapshot.editor_slices.insert(
                        id.to_string(),
                        EditorSlice {
                            form_data,
                            active: true,
                            last_modified,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(editor = %id, error = %e, "skipping editor during state capture");
                }
            }
        }

        codec::write(storage, &self.key, &snapshot);
        self.current = Some(snapshot);
    }

    /// Replays the persisted snapshot into the current registrations.
    ///
    /// No-op when the one-shot guard is set, when the load was classified
    /// as anything but a tab resume, or when no restorable snapshot exists.
    /// Only slices that were active at capture time are replayed; they are
    /// pushed into a matching registration whether or not that registration
    /// has been marked active yet.
    pub fn restore(
        &mut self,
        storage: &dyn SnapshotStorage,
        now: DateTime<Utc>,
        classification: ReloadClassification,
    ) -> Option<SessionSnapshot> {
        if self.restored {
            tracing::debug!(key = %self.key, "restore skipped: already applied this page instance");
            return None;
        }
        if !classification.restore_eligible() {
            return None;
        }

        let snapshot = codec::read(storage, &self.key, now, self.ttl)?;

        for (id, slice) in &snapshot.editor_slices {
            if !slice.active {
                continue;
            }
            let Some(entry) = self.registry.get_mut(id) else {
                continue;
            };
            if let Err(e) = (entry.set_state)(slice.form_data.clone()) {
                tracing::warn!(editor = %id, error = %e, "failed to replay editor slice");
            }
        }

        self.scroll_position = snapshot.scroll_position;
        self.editing_section_id = snapshot.editing_section_id.clone();
        self.domain_data = snapshot.domain_data.clone();
        self.unsaved_changes = snapshot.unsaved_changes;
        self.restored = true;
        self.current = Some(snapshot.clone());

        tracing::debug!(
            key = %self.key,
            slices = snapshot.editor_slices.len(),
            "session snapshot restored"
        );
        Some(snapshot)
    }

    /// Applies the catch-up slice for one late-mounting editor. One-shot:
    /// scheduled at registration time and consumed here.
    pub fn apply_catch_up(&mut self, id: &str) {
        let form_data = match self
            .current
            .as_ref()
            .and_then(|snap| snap.editor_slices.get(id))
        {
            Some(slice) if slice.active => slice.form_data.clone(),
            _ => return,
        };

        let Some(entry) = self.registry.get_mut(id) else {
            return;
        };
        if let Err(e) = (entry.set_state)(form_data) {
            tracing::warn!(editor = %id, error = %e, "catch-up restore failed");
        }
    }

    /// Deletes the persisted snapshot, drops every registration and resets
    /// the restore guard.
    pub fn clear(&mut self, storage: &mut dyn SnapshotStorage) {
        storage.remove(&self.key);
        self.registry.clear();
        self.current = None;
        self.restored = false;
        self.editing_section_id = None;
        self.domain_data = None;
        self.unsaved_changes = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ttl() -> chrono::Duration {
        chrono::Duration::minutes(10)
    }

    fn store_under_test() -> SnapshotStore {
        SnapshotStore::new("presskit-session:/profile".to_string(), ttl())
    }

    /// A state type whose capture always fails, standing in for an editor
    /// that blows up in `get_state`.
    struct BrokenState;

    impl serde::Serialize for BrokenState {
        fn serialize<S>(&self, _: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            Err(serde::ser::Error::custom("capture exploded"))
        }
    }

    impl<'de> serde::Deserialize<'de> for BrokenState {
        fn deserialize<D>(_: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            Err(serde::de::Error::custom("apply exploded"))
        }
    }

    #[test]
    fn store_collects_only_active_editors() {
        let mut store = store_under_test();
        let mut storage = MemoryStorage::new();
        let now = Utc::now();

        store.register("shows-editor", || serde_json::json!({"venue": "9:30 Club"}), |_: Value| {});
        store.register("bio-editor", || serde_json::json!({"text": "draft"}), |_: Value| {});
        store.set_active("shows-editor", true);

        store.store(&mut storage, now, None);

        let snap = store.snapshot().unwrap();
        assert!(snap.editor_slices.contains_key("shows-editor"));
        assert!(!snap.editor_slices.contains_key("bio-editor"));
    }

    #[test]
    fn one_failing_editor_does_not_block_the_others() {
        let mut store = store_under_test();
        let mut storage = MemoryStorage::new();
        let now = Utc::now();

        store.register("gallery-editor", || BrokenState, |_: BrokenState| {});
        store.register(
            "mentions-editor",
            || serde_json::json!({"mentions": ["Pitchfork"]}),
            |_: Value| {},
        );
        store.set_active("gallery-editor", true);
        store.set_active("mentions-editor", true);

        store.store(&mut storage, now, None);

        let snap = store.snapshot().unwrap();
        assert!(!snap.editor_slices.contains_key("gallery-editor"));
        assert_eq!(
            snap.editor_slices["mentions-editor"].form_data,
            serde_json::json!({"mentions": ["Pitchfork"]})
        );
        // And the snapshot actually reached storage.
        assert!(storage.get("presskit-session:/profile").is_some());
    }

    #[test]
    fn restore_replays_active_slice_into_fresh_registration() {
        let mut storage = MemoryStorage::new();
        let now = Utc::now();

        let mut first = store_under_test();
        first.register("shows-editor", || serde_json::json!({"venue": "The Fillmore"}), |_: Value| {});
        first.set_active("shows-editor", true);
        first.store(&mut storage, now, None);

        // New page instance: a fresh store with a spy registration.
        let mut second = store_under_test();
        let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        second.register(
            "shows-editor",
            || serde_json::json!(null),
            move |v: Value| sink.borrow_mut().push(v),
        );

        let restored = second
            .restore(&storage, now, ReloadClassification::TabResume)
            .unwrap();

        assert_eq!(restored.editor_slices.len(), 1);
        assert_eq!(
            *seen.borrow(),
            vec![serde_json::json!({"venue": "The Fillmore"})]
        );
    }

    #[test]
    fn restore_is_one_shot() {
        let mut storage = MemoryStorage::new();
        let now = Utc::now();

        let mut first = store_under_test();
        first.register("shows-editor", || serde_json::json!({"venue": "Red Rocks"}), |_: Value| {});
        first.set_active("shows-editor", true);
        first.store(&mut storage, now, None);

        let mut second = store_under_test();
        let calls = Rc::new(RefCell::new(0u32));
        let counter = Rc::clone(&calls);
        second.register(
            "shows-editor",
            || serde_json::json!(null),
            move |_: Value| *counter.borrow_mut() += 1,
        );

        assert!(second
            .restore(&storage, now, ReloadClassification::TabResume)
            .is_some());
        assert!(second
            .restore(&storage, now, ReloadClassification::TabResume)
            .is_none());
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn restore_skips_inactive_slices() {
        let mut storage = MemoryStorage::new();
        let now = Utc::now();

        let mut first = store_under_test();
        first.register("rider-editor", || serde_json::json!({"items": 3}), |_: Value| {});
        first.set_active("rider-editor", true);
        first.store(&mut storage, now, None);
        first.unregister("rider-editor", now);
        first.store(&mut storage, now, None);

        let mut second = store_under_test();
        let calls = Rc::new(RefCell::new(0u32));
        let counter = Rc::clone(&calls);
        second.register(
            "rider-editor",
            || serde_json::json!(null),
            move |_: Value| *counter.borrow_mut() += 1,
        );

        // Snapshot exists but the slice was retired on unregister.
        assert!(second
            .restore(&storage, now, ReloadClassification::TabResume)
            .is_some());
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn restore_is_refused_for_fresh_navigation() {
        let mut storage = MemoryStorage::new();
        let now = Utc::now();

        let mut first = store_under_test();
        first.register("shows-editor", || serde_json::json!({"venue": "First Ave"}), |_: Value| {});
        first.set_active("shows-editor", true);
        first.store(&mut storage, now, None);

        let mut second = store_under_test();
        assert!(second
            .restore(&storage, now, ReloadClassification::FreshNavigation)
            .is_none());
        assert!(second
            .restore(&storage, now, ReloadClassification::Reload)
            .is_none());
    }

    #[test]
    fn slices_survive_while_their_editor_is_unmounted() {
        let mut storage = MemoryStorage::new();
        let now = Utc::now();

        let mut store = store_under_test();
        store.register("shows-editor", || serde_json::json!({"venue": "Troubadour"}), |_: Value| {});
        store.set_active("shows-editor", true);
        store.store(&mut storage, now, None);

        store.unregister("shows-editor", now);
        // Further captures without the editor must not drop its slice.
        store.store(&mut storage, now + chrono::Duration::seconds(5), None);

        let snap = store.snapshot().unwrap();
        assert_eq!(
            snap.editor_slices["shows-editor"].form_data,
            serde_json::json!({"venue": "Troubadour"})
        );
        assert!(!snap.editor_slices["shows-editor"].active);
    }

    #[test]
    fn register_reports_catch_up_for_active_persisted_slice() {
        let mut storage = MemoryStorage::new();
        let now = Utc::now();

        let mut first = store_under_test();
        first.register("shows-editor", || serde_json::json!({"venue": "Ryman"}), |_: Value| {});
        first.set_active("shows-editor", true);
        first.store(&mut storage, now, None);

        let mut second = store_under_test();
        // Page-level restore runs before any editor has mounted.
        second.restore(&storage, now, ReloadClassification::TabResume);

        let needs_catch_up =
            second.register("shows-editor", || serde_json::json!(null), |_: Value| {});
        assert!(needs_catch_up);

        let no_slice = second.register("new-editor", || serde_json::json!(null), |_: Value| {});
        assert!(!no_slice);
    }

    #[test]
    fn apply_catch_up_pushes_slice_once_registered() {
        let mut storage = MemoryStorage::new();
        let now = Utc::now();

        let mut first = store_under_test();
        first.register("shows-editor", || serde_json::json!({"venue": "The Gorge"}), |_: Value| {});
        first.set_active("shows-editor", true);
        first.store(&mut storage, now, None);

        let mut second = store_under_test();
        second.restore(&storage, now, ReloadClassification::TabResume);

        let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        second.register(
            "shows-editor",
            || serde_json::json!(null),
            move |v: Value| sink.borrow_mut().push(v),
        );
        second.apply_catch_up("shows-editor");

        assert_eq!(*seen.borrow(), vec![serde_json::json!({"venue": "The Gorge"})]);
    }

    #[test]
    fn apply_catch_up_for_unknown_editor_is_noop() {
        let mut store = store_under_test();
        store.apply_catch_up("never-registered");
    }

    #[test]
    fn unchanged_form_data_keeps_its_last_modified() {
        let mut storage = MemoryStorage::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(30);

        let mut store = store_under_test();
        store.register("bio-editor", || serde_json::json!({"text": "same"}), |_: Value| {});
        store.set_active("bio-editor", true);

        store.store(&mut storage, t0, None);
        let first_modified = store.snapshot().unwrap().editor_slices["bio-editor"].last_modified;

        store.store(&mut storage, t1, None);
        let second_modified = store.snapshot().unwrap().editor_slices["bio-editor"].last_modified;

        assert_eq!(first_modified, second_modified);
        assert_eq!(store.snapshot().unwrap().last_active, t1);
    }

    #[test]
    fn clear_removes_blob_and_registrations() {
        let mut storage = MemoryStorage::new();
        let now = Utc::now();

        let mut store = store_under_test();
        store.register("shows-editor", || serde_json::json!(1), |_: Value| {});
        store.set_active("shows-editor", true);
        store.store(&mut storage, now, None);

        store.clear(&mut storage);

        assert!(storage.get("presskit-session:/profile").is_none());
        assert!(store.snapshot().is_none());
        // Registry is empty: a fresh capture produces no slices.
        store.store(&mut storage, now, None);
        assert!(store.snapshot().unwrap().editor_slices.is_empty());
    }

    #[test]
    fn overrides_stick_for_subsequent_captures() {
        let mut storage = MemoryStorage::new();
        let now = Utc::now();
        let mut store = store_under_test();

        store.store(
            &mut storage,
            now,
            Some(SnapshotOverrides {
                scroll_position: Some(900),
                unsaved_changes: Some(true),
                domain_data: Some(serde_json::json!({"artist": "The Nationals"})),
            }),
        );
        store.store(&mut storage, now + chrono::Duration::seconds(5), None);

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.scroll_position, 900);
        assert!(snap.unsaved_changes);
        assert_eq!(
            snap.domain_data,
            Some(serde_json::json!({"artist": "The Nationals"}))
        );
    }
}
