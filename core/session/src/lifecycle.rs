//! Page-lifecycle state machine and reload classification.
//!
//! The observer consumes the lifecycle signals the host shell forwards
//! (visibility changes, focus/blur, the unload prompt) and answers with the
//! persistence action the coordinator should take. It never touches storage
//! itself, which keeps every transition unit-testable with a manual clock.
//!
//! ```text
//! Uninitialized -> Active <-> Hidden      (Restoring is transient, entered
//!                                          on any transition into Active
//!                                          that attempts a restore)
//! hidden/blur   : Active -> Hidden, capture immediately
//! visible/focus : Hidden -> Active, attempt restore
//! ```
//!
//! Reload classification is sampled once from the navigation-timing record
//! of the current document load. An explicit reload, or a bare navigation
//! with no prior session state, means the user asked for a clean page:
//! persisted state is cleared, never resurrected. Anything else is a tab
//! resume and is restore-eligible.

use chrono::{DateTime, Utc};

/// Navigation type reported by the host's navigation-timing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationType {
    Navigate,
    Reload,
    BackForward,
    Prerender,
}

/// The navigation-timing sample for the current document load.
#[derive(Debug, Clone, Copy)]
pub struct NavigationTiming {
    pub navigation_type: NavigationType,
    /// Whether any session state existed for this route before the load.
    pub has_prior_state: bool,
}

/// Why the current page instance came into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadClassification {
    FreshNavigation,
    Reload,
    TabResume,
}

impl ReloadClassification {
    pub fn classify(timing: &NavigationTiming) -> Self {
        match timing.navigation_type {
            NavigationType::Reload => ReloadClassification::Reload,
            NavigationType::Navigate if !timing.has_prior_state => {
                ReloadClassification::FreshNavigation
            }
            _ => ReloadClassification::TabResume,
        }
    }

    /// Fresh loads and explicit reloads drop persisted state instead of
    /// restoring it.
    pub fn clears_state(&self) -> bool {
        matches!(
            self,
            ReloadClassification::FreshNavigation | ReloadClassification::Reload
        )
    }

    pub fn restore_eligible(&self) -> bool {
        matches!(self, ReloadClassification::TabResume)
    }
}

/// Lifecycle signals forwarded by the host shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    VisibilityHidden,
    VisibilityVisible,
    FocusGained,
    FocusLost,
}

/// What the coordinator should do in response to a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Directive {
    StoreNow,
    RestoreNow,
    Nothing,
}

/// Whether the host should let an unload proceed or suppress it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadDecision {
    Proceed,
    /// The page went hidden within the guard window; the unload is likely
    /// collateral of a rapid tab switch.
    Suppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Uninitialized,
    Active,
    Hidden,
    Restoring,
}

#[derive(Debug)]
pub(crate) struct LifecycleObserver {
    phase: LifecyclePhase,
    classification: ReloadClassification,
    hidden_at: Option<DateTime<Utc>>,
    guard_window: chrono::Duration,
}

impl LifecycleObserver {
    pub(crate) fn new(timing: &NavigationTiming, guard_window: chrono::Duration) -> Self {
        LifecycleObserver {
            phase: LifecyclePhase::Uninitialized,
            classification: ReloadClassification::classify(timing),
            hidden_at: None,
            guard_window,
        }
    }

    pub(crate) fn classification(&self) -> ReloadClassification {
        self.classification
    }

    pub(crate) fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Initial mount transition.
    pub(crate) fn activate(&mut self) {
        if self.phase == LifecyclePhase::Uninitialized {
            self.phase = LifecyclePhase::Active;
        }
    }

    pub(crate) fn on_event(&mut self, event: LifecycleEvent, now: DateTime<Utc>) -> Directive {
        match (event, self.phase) {
            (LifecycleEvent::VisibilityHidden | LifecycleEvent::FocusLost, LifecyclePhase::Active) => {
                self.phase = LifecyclePhase::Hidden;
                self.hidden_at = Some(now);
                Directive::StoreNow
            }
            (
                LifecycleEvent::VisibilityVisible | LifecycleEvent::FocusGained,
                LifecyclePhase::Hidden,
            ) => {
                self.phase = LifecyclePhase::Restoring;
                Directive::RestoreNow
            }
            _ => Directive::Nothing,
        }
    }

    /// Completes the transient restoring phase after a restore attempt.
    pub(crate) fn finish_restore(&mut self) {
        if self.phase == LifecyclePhase::Restoring {
            self.phase = LifecyclePhase::Active;
        }
    }

    /// Periodic captures only run while the page is actually visible.
    pub(crate) fn should_store_on_tick(&self) -> bool {
        self.phase == LifecyclePhase::Active
    }

    /// The unload-time decision. The guard expires on its own once the
    /// window has elapsed; no explicit reset is needed.
    pub(crate) fn on_before_unload(&self, now: DateTime<Utc>) -> UnloadDecision {
        match self.hidden_at {
            Some(hidden_at) if now.signed_duration_since(hidden_at) <= self.guard_window => {
                UnloadDecision::Suppress
            }
            _ => UnloadDecision::Proceed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(navigation_type: NavigationType, has_prior_state: bool) -> NavigationTiming {
        NavigationTiming {
            navigation_type,
            has_prior_state,
        }
    }

    fn resumed_observer() -> LifecycleObserver {
        let mut observer = LifecycleObserver::new(
            &timing(NavigationType::Navigate, true),
            chrono::Duration::seconds(1),
        );
        observer.activate();
        observer
    }

    #[test]
    fn reload_classifies_as_reload() {
        let c = ReloadClassification::classify(&timing(NavigationType::Reload, true));
        assert_eq!(c, ReloadClassification::Reload);
        assert!(c.clears_state());
        assert!(!c.restore_eligible());
    }

    #[test]
    fn bare_navigate_without_prior_state_is_fresh() {
        let c = ReloadClassification::classify(&timing(NavigationType::Navigate, false));
        assert_eq!(c, ReloadClassification::FreshNavigation);
        assert!(c.clears_state());
    }

    #[test]
    fn navigate_with_prior_state_is_tab_resume() {
        let c = ReloadClassification::classify(&timing(NavigationType::Navigate, true));
        assert_eq!(c, ReloadClassification::TabResume);
        assert!(c.restore_eligible());
    }

    #[test]
    fn back_forward_is_tab_resume() {
        let c = ReloadClassification::classify(&timing(NavigationType::BackForward, false));
        assert_eq!(c, ReloadClassification::TabResume);
    }

    #[test]
    fn hide_then_show_drives_store_then_restore() {
        let mut observer = resumed_observer();
        let now = Utc::now();

        assert_eq!(
            observer.on_event(LifecycleEvent::VisibilityHidden, now),
            Directive::StoreNow
        );
        assert_eq!(observer.phase(), LifecyclePhase::Hidden);

        assert_eq!(
            observer.on_event(LifecycleEvent::VisibilityVisible, now),
            Directive::RestoreNow
        );
        assert_eq!(observer.phase(), LifecyclePhase::Restoring);

        observer.finish_restore();
        assert_eq!(observer.phase(), LifecyclePhase::Active);
    }

    #[test]
    fn focus_while_already_active_does_nothing() {
        let mut observer = resumed_observer();
        assert_eq!(
            observer.on_event(LifecycleEvent::FocusGained, Utc::now()),
            Directive::Nothing
        );
    }

    #[test]
    fn blur_while_hidden_does_nothing() {
        let mut observer = resumed_observer();
        let now = Utc::now();
        observer.on_event(LifecycleEvent::VisibilityHidden, now);
        assert_eq!(
            observer.on_event(LifecycleEvent::FocusLost, now),
            Directive::Nothing
        );
    }

    #[test]
    fn periodic_store_only_while_visible() {
        let mut observer = resumed_observer();
        assert!(observer.should_store_on_tick());
        observer.on_event(LifecycleEvent::VisibilityHidden, Utc::now());
        assert!(!observer.should_store_on_tick());
    }

    #[test]
    fn unload_inside_guard_window_is_suppressed() {
        let mut observer = resumed_observer();
        let now = Utc::now();
        observer.on_event(LifecycleEvent::VisibilityHidden, now);

        assert_eq!(
            observer.on_before_unload(now + chrono::Duration::milliseconds(400)),
            UnloadDecision::Suppress
        );
    }

    #[test]
    fn unload_after_guard_window_proceeds() {
        let mut observer = resumed_observer();
        let now = Utc::now();
        observer.on_event(LifecycleEvent::VisibilityHidden, now);

        assert_eq!(
            observer.on_before_unload(now + chrono::Duration::milliseconds(1001)),
            UnloadDecision::Proceed
        );
    }

    #[test]
    fn unload_without_recent_hide_proceeds() {
        let observer = resumed_observer();
        assert_eq!(
            observer.on_before_unload(Utc::now()),
            UnloadDecision::Proceed
        );
    }
}
