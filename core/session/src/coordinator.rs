//! The editing-session coordinator service.
//!
//! One `SessionCoordinator` exists per mounted editing view. It is an
//! explicit service object: the host constructs it with an injected storage
//! backend and clock, forwards lifecycle signals to it, drives its deferred
//! work with `tick()`, and calls `dispose()` on teardown. Nothing here is
//! ambient or global.
//!
//! On construction the coordinator classifies the current document load.
//! Fresh navigations and explicit reloads get a clean slate - any persisted
//! snapshot is cleared before a restore could see it. Tab resumes schedule a
//! restore for the next tick, leaving the host a synchronous window to
//! register its editors first; editors that mount later are caught up
//! individually.
//!
//! Every failure path below is best-effort and silent (worst case: no
//! restoration happens). The only signal back to the user is their state
//! reappearing.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::lifecycle::{
    Directive, LifecycleEvent, LifecycleObserver, LifecyclePhase, NavigationTiming,
    ReloadClassification, UnloadDecision,
};
use crate::page_cache::{PageState, PageStateCache};
use crate::schedule::{Scheduler, TaskToken};
use crate::state::codec;
use crate::state::{SessionSnapshot, SnapshotOverrides, SnapshotStore, STALENESS_WINDOW_SECS};
use crate::storage::{MemoryStorage, SnapshotStorage};

/// Tuning knobs for one coordinator instance. `for_route` gives the
/// reference behavior: 10-minute staleness windows, 5-second persistence
/// interval, 750 ms debounce, 1-second unload guard.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Route path of the owning view; becomes part of the storage key so
    /// snapshots never leak across unrelated views.
    pub route: String,
    pub key_prefix: String,
    pub snapshot_ttl: chrono::Duration,
    pub page_ttl: chrono::Duration,
    /// Cadence of the periodic capture while the page is visible.
    pub save_interval: chrono::Duration,
    /// Quiet window after a page change before the page blob is written.
    pub debounce_window: chrono::Duration,
    /// Settle time before the restored scroll offset is handed to the host.
    pub scroll_restore_delay: chrono::Duration,
    /// How long after going hidden an unload is still treated as collateral
    /// of a rapid tab switch.
    pub hidden_guard_window: chrono::Duration,
}

impl CoordinatorConfig {
    pub fn for_route(route: impl Into<String>) -> Self {
        CoordinatorConfig {
            route: route.into(),
            key_prefix: "presskit-session:".to_string(),
            snapshot_ttl: chrono::Duration::seconds(STALENESS_WINDOW_SECS),
            page_ttl: chrono::Duration::seconds(STALENESS_WINDOW_SECS),
            save_interval: chrono::Duration::seconds(5),
            debounce_window: chrono::Duration::milliseconds(750),
            scroll_restore_delay: chrono::Duration::milliseconds(100),
            hidden_guard_window: chrono::Duration::seconds(1),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig::for_route("/")
    }
}

/// Side effects `tick()` asks the host to perform. Only the host can touch
/// the viewport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RestoreScroll(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskKind {
    InitialRestore,
    PeriodicStore,
    PageInterval,
    PageDebounce,
    ScrollRestore(u64),
    EditorCatchUp(String),
}

pub struct SessionCoordinator {
    config: CoordinatorConfig,
    clock: Box<dyn Clock>,
    storage: Box<dyn SnapshotStorage>,
    store: SnapshotStore,
    page_cache: PageStateCache,
    lifecycle: LifecycleObserver,
    scheduler: Scheduler<TaskKind>,
    debounce_token: Option<TaskToken>,
    disposed: bool,
}

impl SessionCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        timing: NavigationTiming,
        storage: Box<dyn SnapshotStorage>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let key = codec::storage_key(&config.key_prefix, &config.route);
        let mut coordinator = SessionCoordinator {
            store: SnapshotStore::new(key.clone(), config.snapshot_ttl),
            page_cache: PageStateCache::new(&key, config.page_ttl),
            lifecycle: LifecycleObserver::new(&timing, config.hidden_guard_window),
            scheduler: Scheduler::new(),
            debounce_token: None,
            disposed: false,
            config,
            clock,
            storage,
        };
        coordinator.initialize();
        coordinator
    }

    /// In-memory storage and the system clock; the common embedding.
    pub fn with_defaults(route: impl Into<String>, timing: NavigationTiming) -> Self {
        SessionCoordinator::new(
            CoordinatorConfig::for_route(route),
            timing,
            Box::new(MemoryStorage::new()),
            Box::new(SystemClock),
        )
    }

    fn initialize(&mut self) {
        let now = self.clock.now();
        let classification = self.lifecycle.classification();

        if classification.clears_state() {
            tracing::debug!(?classification, "clean load: dropping persisted session state");
            self.store.clear(self.storage.as_mut());
        } else {
            // Deferred to the first tick so synchronously-mounting editors
            // get their slices replayed directly.
            self.scheduler.schedule_at(now, TaskKind::InitialRestore);
        }
        self.lifecycle.activate();

        self.scheduler
            .schedule_at(now + self.config.save_interval, TaskKind::PeriodicStore);
        self.scheduler
            .schedule_at(now + self.config.save_interval, TaskKind::PageInterval);
    }

    // ---- registration API -------------------------------------------------

    /// Registers (or replaces) the editor for `id`. The editor declares its
    /// own serializable state type; the coordinator never interprets it.
    pub fn register_editor<T, G, S>(&mut self, id: impl Into<String>, get: G, set: S)
    where
        T: Serialize + DeserializeOwned,
        G: Fn() -> T + 'static,
        S: FnMut(T) + 'static,
    {
        if self.disposed {
            return;
        }
        let id = id.into();
        if self.store.register(id.clone(), get, set) {
            let now = self.clock.now();
            self.scheduler.schedule_at(now, TaskKind::EditorCatchUp(id));
        }
    }

    pub fn unregister_editor(&mut self, id: &str) {
        if self.disposed {
            return;
        }
        let now = self.clock.now();
        self.store.unregister(id, now);
    }

    pub fn set_editor_active(&mut self, id: &str, active: bool) {
        if self.disposed {
            return;
        }
        self.store.set_active(id, active);
    }

    // ---- snapshot API -----------------------------------------------------

    /// Captures and persists the current session state.
    pub fn store_state(&mut self, extra: Option<SnapshotOverrides>) {
        if self.disposed {
            return;
        }
        let now = self.clock.now();
        self.store.store(self.storage.as_mut(), now, extra);
    }

    /// Attempts the one-shot restore. Returns the snapshot that was applied,
    /// or `None` when already restored, not eligible, or nothing valid is
    /// persisted.
    pub fn restore_state(&mut self) -> Option<SessionSnapshot> {
        if self.disposed {
            return None;
        }
        let now = self.clock.now();
        self.run_restore(now)
    }

    pub fn clear_state(&mut self) {
        if self.disposed {
            return;
        }
        self.store.clear(self.storage.as_mut());
    }

    pub fn update_domain_data(&mut self, data: Value) {
        if self.disposed {
            return;
        }
        self.store.update_domain_data(data);
    }

    pub fn update_editing_section(&mut self, section_id: Option<String>) {
        if self.disposed {
            return;
        }
        self.store.update_editing_section(section_id);
    }

    pub fn get_editing_section(&self) -> Option<String> {
        self.store.editing_section()
    }

    /// Host-reported scroll offset, captured into the next snapshot.
    pub fn update_scroll_position(&mut self, offset: u64) {
        if self.disposed {
            return;
        }
        self.store.update_scroll_position(offset);
    }

    pub fn unsaved_changes(&self) -> bool {
        self.store.unsaved_changes()
    }

    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.store.snapshot()
    }

    pub fn classification(&self) -> ReloadClassification {
        self.lifecycle.classification()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.lifecycle.phase()
    }

    // ---- lifecycle surface ------------------------------------------------

    pub fn handle_event(&mut self, event: LifecycleEvent) {
        if self.disposed {
            return;
        }
        let now = self.clock.now();
        match self.lifecycle.on_event(event, now) {
            Directive::StoreNow => {
                self.store.store(self.storage.as_mut(), now, None);
            }
            Directive::RestoreNow => {
                self.run_restore(now);
                self.lifecycle.finish_restore();
            }
            Directive::Nothing => {}
        }
    }

    /// Synchronous unload-time capture plus the suppress-or-proceed verdict
    /// for the host's unload prompt.
    pub fn on_before_unload(&mut self) -> UnloadDecision {
        if self.disposed {
            return UnloadDecision::Proceed;
        }
        let now = self.clock.now();
        self.store.store(self.storage.as_mut(), now, None);
        // Flush a pending debounced page save; the page blob should not
        // trail the unload.
        if let Some(token) = self.debounce_token.take() {
            self.scheduler.cancel(token);
            self.page_cache.save(self.storage.as_mut(), now);
        }
        self.lifecycle.on_before_unload(now)
    }

    /// Runs every due deferred task. The host calls this from its frame or
    /// timer loop; returned effects are the host's to apply.
    pub fn tick(&mut self) -> Vec<Effect> {
        if self.disposed {
            return Vec::new();
        }
        let now = self.clock.now();
        let mut effects = Vec::new();

        for task in self.scheduler.take_due(now) {
            match task {
                TaskKind::InitialRestore => {
                    self.run_restore(now);
                }
                TaskKind::PeriodicStore => {
                    if self.lifecycle.should_store_on_tick() {
                        self.store.store(self.storage.as_mut(), now, None);
                    }
                    self.scheduler
                        .schedule_at(now + self.config.save_interval, TaskKind::PeriodicStore);
                }
                TaskKind::PageInterval => {
                    self.page_cache.save(self.storage.as_mut(), now);
                    self.scheduler
                        .schedule_at(now + self.config.save_interval, TaskKind::PageInterval);
                }
                TaskKind::PageDebounce => {
                    self.debounce_token = None;
                    self.page_cache.save(self.storage.as_mut(), now);
                }
                TaskKind::ScrollRestore(offset) => {
                    effects.push(Effect::RestoreScroll(offset));
                }
                TaskKind::EditorCatchUp(id) => {
                    self.store.apply_catch_up(&id);
                }
            }
        }

        effects
    }

    // ---- secondary page-state surface -------------------------------------

    /// Records new page-level state and (re)arms the debounced save.
    pub fn note_page_change(&mut self, state: PageState) {
        if self.disposed {
            return;
        }
        let now = self.clock.now();
        self.page_cache.note_change(state);
        if let Some(token) = self.debounce_token.take() {
            self.scheduler.cancel(token);
        }
        self.debounce_token = Some(
            self.scheduler
                .schedule_at(now + self.config.debounce_window, TaskKind::PageDebounce),
        );
    }

    /// One-shot restore of the page-level blob.
    pub fn restore_page_state(&mut self) -> Option<PageState> {
        if self.disposed {
            return None;
        }
        let now = self.clock.now();
        self.page_cache.restore_once(self.storage.as_ref(), now)
    }

    pub fn clear_page_state(&mut self) {
        if self.disposed {
            return;
        }
        self.page_cache.clear(self.storage.as_mut());
    }

    // ---- teardown ---------------------------------------------------------

    /// Cancels every pending timer and turns all further calls into no-ops.
    /// Nothing is persisted here; hosts that want a final capture call
    /// `on_before_unload` first.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.scheduler.cancel_all();
        self.debounce_token = None;
        self.disposed = true;
        tracing::debug!(route = %self.config.route, "session coordinator disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn run_restore(&mut self, now: DateTime<Utc>) -> Option<SessionSnapshot> {
        let classification = self.lifecycle.classification();
        let snapshot = self
            .store
            .restore(self.storage.as_ref(), now, classification)?;
        self.scheduler.schedule_at(
            now + self.config.scroll_restore_delay,
            TaskKind::ScrollRestore(snapshot.scroll_position),
        );
        Some(snapshot)
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}
