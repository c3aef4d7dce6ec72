//! Sync-req batches: the per-draw/dispatch/pass-begin/transfer collection
//! of per-resource sync requirements, assembled before any barrier is
//! derived, plus submit-time patch-barrier reconciliation.
//!
//! Grounded on `ngfvk_sync_req_batch_*` in
//! `original_source/source/ngf-vk/impl.c`.

use fnv::FnvHashMap;

use super::barrier::{derive_barrier, Barrier};
use super::state::{merge_reqs, reqs_compatible, LocalSyncState, SyncReq, SyncState};

/// Opaque identity used to key sync state dictionaries. Any resource
/// handle that's cheap to hash works; the sync engine never interprets
/// this value, only compares it.
pub type ResourceKey = u64;

/// Collects per-resource sync requirements for a single operation
/// (a draw, a dispatch, a pass-begin, a transfer) before any barrier is
/// derived against them.
#[derive(Default)]
pub struct SyncReqBatch {
    entries: FnvHashMap<ResourceKey, SyncReq>,
    order: Vec<ResourceKey>,
}

impl SyncReqBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a request for `key`, merging it with any existing request for
    /// the same resource in this batch. Incompatible merges are dropped
    /// (the earlier request wins) and a warning is logged.
    pub fn add(&mut self, key: ResourceKey, req: SyncReq) {
        match self.entries.get_mut(&key) {
            Some(existing) => {
                if reqs_compatible(existing, &req) {
                    merge_reqs(existing, &req);
                } else {
                    tracing::warn!(
                        ?key,
                        "dropping incompatible sync request merge within one batch"
                    );
                }
            }
            None => {
                self.order.push(key);
                self.entries.insert(key, req);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Derives a barrier for each entry against its resource's *local*
    /// sync state, in insertion order. Resources seen for the first time
    /// in this command buffer record `expected_sync_req` instead of
    /// emitting a barrier — the submit-time patch pass handles those.
    pub fn commit(
        &self,
        local_states: &mut FnvHashMap<ResourceKey, LocalSyncState>,
        default_state: impl Fn() -> SyncState,
    ) -> Vec<(ResourceKey, Barrier)> {
        let mut barriers = Vec::new();
        for key in &self.order {
            let req = self.entries[key];
            let first_touch = !local_states.contains_key(key);
            let entry = local_states.entry(*key).or_insert_with(|| LocalSyncState {
                state: default_state(),
                expected_sync_req: req,
                had_barrier: false,
            });
            if first_touch {
                continue;
            }
            if let Some(barrier) = derive_barrier(&mut entry.state, &req) {
                entry.had_barrier = true;
                barriers.push((*key, barrier));
            }
        }
        barriers
    }
}

/// At submit time, reconciles a command buffer's local state against each
/// touched resource's true global state, producing the barriers for the
/// single auxiliary "patch" command buffer prepended before it, then folds
/// the command buffer's final local state into global state.
pub fn patch_barriers(
    local_states: &FnvHashMap<ResourceKey, LocalSyncState>,
    global_states: &mut FnvHashMap<ResourceKey, SyncState>,
) -> Vec<(ResourceKey, Barrier)> {
    let mut patches = Vec::new();
    for (key, local) in local_states {
        let global = global_states.entry(*key).or_insert_with(SyncState::default);

        if let Some(barrier) = derive_barrier(global, &local.expected_sync_req) {
            patches.push((*key, barrier));
        }

        if !local.state.last_writer.is_empty() {
            *global = local.state;
        } else {
            global.active_readers.merge(local.state.active_readers);
            global.per_stage_readers_mask |= local.state.per_stage_readers_mask;
            global.layout = local.state.layout;
        }
    }
    patches
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "vulkan")]
    use ash::vk;
    #[cfg(not(feature = "vulkan"))]
    use super::super::flags as vk;

    #[test]
    fn incompatible_writes_in_one_batch_are_dropped() {
        let mut batch = SyncReqBatch::new();
        let key = 1u64;
        batch.add(
            key,
            SyncReq::new(vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER),
        );
        batch.add(
            key,
            SyncReq::new(vk::AccessFlags::SHADER_WRITE, vk::PipelineStageFlags::COMPUTE_SHADER),
        );
        let mut local_states = FnvHashMap::default();
        let barriers = batch.commit(&mut local_states, SyncState::new_buffer);
        assert!(barriers.is_empty(), "first touch records expected_sync_req, no barrier yet");
        let recorded = local_states[&key].expected_sync_req;
        assert_eq!(recorded.access_mask, vk::AccessFlags::TRANSFER_WRITE, "second write was dropped");
    }

    #[test]
    fn patch_barrier_reconciles_cross_cmdbuf_hazard() {
        let mut global = FnvHashMap::default();
        let key = 7u64;
        global.insert(key, SyncState::new_buffer());

        // cmd buffer 1: writes via transfer
        let mut local1 = FnvHashMap::default();
        let mut batch1 = SyncReqBatch::new();
        batch1.add(key, SyncReq::new(vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER));
        batch1.commit(&mut local1, SyncState::new_buffer);
        let patches1 = patch_barriers(&local1, &mut global);
        assert!(patches1.is_empty(), "nothing to reconcile against a pristine global state");

        // cmd buffer 2: reads via uniform in vertex stage
        let mut local2 = FnvHashMap::default();
        let mut batch2 = SyncReqBatch::new();
        batch2.add(key, SyncReq::new(vk::AccessFlags::UNIFORM_READ, vk::PipelineStageFlags::VERTEX_SHADER));
        batch2.commit(&mut local2, SyncState::new_buffer);
        let patches2 = patch_barriers(&local2, &mut global);

        assert_eq!(patches2.len(), 1);
        let (_, barrier) = patches2[0];
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::UNIFORM_READ);
    }
}
