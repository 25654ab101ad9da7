//! Editing-session state coordination for the press-kit editor.
//!
//! Preserves in-progress, unsaved form state across involuntary
//! page-lifecycle transitions - background-tab suspension, visibility
//! toggling, transient reloads - while making sure an intentional refresh
//! never resurrects stale state.
//!
//! The entry point is [`SessionCoordinator`]: one per mounted editing view,
//! constructed with an injected [`storage::SnapshotStorage`] backend and
//! [`clock::Clock`]. Editable sections register typed state accessors with
//! it; the coordinator captures their slices on lifecycle transitions and a
//! periodic interval, and replays them at most once per page instance when
//! the load is classified as a tab resume.
//!
//! A secondary layer ([`PageState`]) covers page-level state with no editor
//! owner, persisted on a debounce with its own version and staleness
//! window.
//!
//! Everything is best-effort: storage failures, malformed blobs and broken
//! editors are logged (via `tracing`) and swallowed. The worst case is that
//! no restoration happens; the coordinator never surfaces an error to the
//! user.

pub mod clock;
pub mod coordinator;
pub mod lifecycle;
pub mod page_cache;
pub mod schedule;
pub mod state;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{CoordinatorConfig, Effect, SessionCoordinator};
pub use lifecycle::{
    LifecycleEvent, LifecyclePhase, NavigationTiming, NavigationType, ReloadClassification,
    UnloadDecision,
};
pub use page_cache::{PageState, PAGE_CACHE_VERSION};
pub use state::{
    EditorSlice, SessionSnapshot, SliceError, SnapshotOverrides, SnapshotStore, SCHEMA_VERSION,
};
pub use storage::{FileStorage, MemoryStorage, SnapshotStorage, StorageError};
