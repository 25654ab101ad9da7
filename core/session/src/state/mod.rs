//! Session snapshot model, codec and store.

pub(crate) mod codec;
mod registry;
mod store;
pub(crate) mod types;

pub use registry::SliceError;
pub use store::{SnapshotOverrides, SnapshotStore};
pub use types::{EditorSlice, SessionSnapshot, SCHEMA_VERSION, STALENESS_WINDOW_SECS};
