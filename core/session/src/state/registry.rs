//! Registry of editable sections.
//!
//! Each independently-owned editor on the page (shows editor, mentions
//! editor, rider builder, ...) registers a pair of state accessors under a
//! stable id. Registrations are in-memory only and never serialized; the
//! snapshot layer persists the *values* the accessors produce.
//!
//! The public registration API is typed: an editor declares its own
//! serializable state type and the registry erases it to `serde_json::Value`
//! internally, so the coordinator stays payload-agnostic. Conversion
//! failures surface as [`SliceError`] and are handled per editor - one
//! editor's bad state never blocks the others.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("failed to capture editor state: {0}")]
    Capture(#[source] serde_json::Error),

    #[error("failed to apply editor state: {0}")]
    Apply(#[source] serde_json::Error),
}

type GetStateFn = Box<dyn Fn() -> Result<Value, SliceError>>;
type SetStateFn = Box<dyn FnMut(Value) -> Result<(), SliceError>>;

pub(crate) struct EditorRegistration {
    pub(crate) get_state: GetStateFn,
    pub(crate) set_state: SetStateFn,
    pub(crate) active: bool,
}

/// Table of live editor registrations, at most one per id. Re-registering an
/// id replaces the previous entry without error; operations on unknown ids
/// are no-ops.
#[derive(Default)]
pub(crate) struct EditorRegistry {
    entries: HashMap<String, EditorRegistration>,
}

impl EditorRegistry {
    pub(crate) fn new() -> Self {
        EditorRegistry::default()
    }

    /// Inserts or replaces the registration for `id`. New registrations
    /// start inactive; the editor flips itself active once mounted.
    pub(crate) fn register<T, G, S>(&mut self, id: impl Into<String>, get: G, mut set: S)
    where
        T: Serialize + DeserializeOwned,
        G: Fn() -> T + 'static,
        S: FnMut(T) + 'static,
    {
        let id = id.into();
        let get_state: GetStateFn =
            Box::new(move || serde_json::to_value(get()).map_err(SliceError::Capture));
        let set_state: SetStateFn = Box::new(move |value: Value| {
            let typed: T = serde_json::from_value(value).map_err(SliceError::Apply)?;
            set(typed);
            Ok(())
        });

        if self
            .entries
            .insert(
                id.clone(),
                EditorRegistration {
                    get_state,
                    set_state,
                    active: false,
                },
            )
            .is_some()
        {
            tracing::debug!(editor = %id, "replaced existing editor registration");
        }
    }

    pub(crate) fn set_active(&mut self, id: &str, active: bool) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.active = active;
        }
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<EditorRegistration> {
        self.entries.remove(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut EditorRegistration> {
        self.entries.get_mut(id)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn iter_active(&self) -> impl Iterator<Item = (&str, &EditorRegistration)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.active)
            .map(|(id, entry)| (id.as_str(), entry))
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn registered_editor_captures_state() {
        let mut registry = EditorRegistry::new();
        registry.register("shows-editor", || serde_json::json!({"venue": "The Fillmore"}), |_: Value| {});
        registry.set_active("shows-editor", true);

        let (id, entry) = registry.iter_active().next().unwrap();
        assert_eq!(id, "shows-editor");
        assert_eq!(
            (entry.get_state)().unwrap(),
            serde_json::json!({"venue": "The Fillmore"})
        );
    }

    #[test]
    fn reregistering_replaces_previous_entry() {
        let mut registry = EditorRegistry::new();
        registry.register("bio-editor", || 1u32, |_: u32| {});
        registry.register("bio-editor", || 2u32, |_: u32| {});
        registry.set_active("bio-editor", true);

        assert_eq!(registry.len(), 1);
        let (_, entry) = registry.iter_active().next().unwrap();
        assert_eq!((entry.get_state)().unwrap(), serde_json::json!(2));
    }

    #[test]
    fn new_registrations_start_inactive() {
        let mut registry = EditorRegistry::new();
        registry.register("bio-editor", || 0u32, |_: u32| {});
        assert_eq!(registry.iter_active().count(), 0);
    }

    #[test]
    fn operations_on_unknown_id_are_noops() {
        let mut registry = EditorRegistry::new();
        registry.set_active("ghost", true);
        assert!(registry.remove("ghost").is_none());
        assert!(!registry.contains("ghost"));
    }

    #[test]
    fn set_state_decodes_into_typed_closure() {
        let mut registry = EditorRegistry::new();
        let seen: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        registry.register("counter", || 0u32, move |v: u32| sink.borrow_mut().push(v));

        let entry = registry.get_mut("counter").unwrap();
        (entry.set_state)(serde_json::json!(7)).unwrap();

        assert_eq!(*seen.borrow(), vec![7]);
    }

    #[test]
    fn set_state_with_wrong_shape_reports_apply_error() {
        let mut registry = EditorRegistry::new();
        registry.register("counter", || 0u32, |_: u32| {});

        let entry = registry.get_mut("counter").unwrap();
        let result = (entry.set_state)(serde_json::json!("not a number"));

        assert!(matches!(result, Err(SliceError::Apply(_))));
    }
}
