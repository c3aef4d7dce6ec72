//! The automatic synchronization engine: per-resource sync state, the
//! barrier-derivation routine, and sync-req batching/patch-barrier
//! reconciliation at submit time.
//!
//! This is the component spec.md calls out as the core of the crate
//! (§4.C10); everything else in the crate exists to feed it correctly
//! ordered sync requests and to consume the barriers it produces.

pub mod barrier;
pub mod batch;
#[cfg(not(feature = "vulkan"))]
mod flags;
pub mod stage;
pub mod state;

pub use barrier::{derive_barrier, Barrier};
pub use batch::{patch_barriers, ResourceKey, SyncReqBatch};
pub use stage::Stage;
pub use state::{AccessStages, LocalSyncState, SyncReq, SyncState};
