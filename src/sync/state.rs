//! Per-resource synchronization state and the sync requirement a pending
//! operation places on a resource, grounded on spec.md §4.C10's
//! `SyncState`/`SyncReq` and `ngfvk_sync_state`/`ngfvk_sync_req` in
//! `original_source/source/ngf-vk/impl.c`.

#[cfg(feature = "vulkan")]
use ash::vk;
#[cfg(not(feature = "vulkan"))]
use super::flags as vk;

/// `{access_mask, stage_mask}` — what kind of access, and from which
/// stages, a write or read group represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessStages {
    pub access_mask: vk::AccessFlags,
    pub stage_mask: vk::PipelineStageFlags,
}

impl AccessStages {
    pub fn is_empty(&self) -> bool {
        self.stage_mask.is_empty()
    }

    pub fn merge(&mut self, other: AccessStages) {
        self.access_mask |= other.access_mask;
        self.stage_mask |= other.stage_mask;
    }
}

/// Per-resource synchronization state: a record of who wrote it last, who
/// has read it since, and (for images) its current layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncState {
    pub last_writer: AccessStages,
    pub active_readers: AccessStages,
    pub per_stage_readers_mask: u32,
    pub layout: vk::ImageLayout,
}

impl SyncState {
    pub fn new_buffer() -> Self {
        Self {
            layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        }
    }

    pub fn new_image(initial_layout: vk::ImageLayout) -> Self {
        Self {
            layout: initial_layout,
            ..Default::default()
        }
    }
}

/// A resource's local state inside one command buffer's recording. Carries
/// the extra bookkeeping the submit-time patch-barrier pass needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSyncState {
    pub state: SyncState,
    /// The sync requirement this command buffer assumed the resource was
    /// already in when it first touched it; compared at submit time
    /// against the resource's real global state.
    pub expected_sync_req: SyncReq,
    /// Whether any intra-command-buffer barrier has already been emitted
    /// for this resource.
    pub had_barrier: bool,
}

/// How the next operation intends to use a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReq {
    pub access_mask: vk::AccessFlags,
    pub stage_mask: vk::PipelineStageFlags,
    pub layout: vk::ImageLayout,
}

impl SyncReq {
    pub fn new(access_mask: vk::AccessFlags, stage_mask: vk::PipelineStageFlags) -> Self {
        Self {
            access_mask,
            stage_mask,
            layout: vk::ImageLayout::UNDEFINED,
        }
    }

    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    pub(crate) const ALL_WRITES: vk::AccessFlags = vk::AccessFlags::from_raw(
        vk::AccessFlags::SHADER_WRITE.as_raw()
            | vk::AccessFlags::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
    );

    pub fn wants_write(&self, current_layout: vk::ImageLayout) -> bool {
        self.access_mask.intersects(Self::ALL_WRITES) || self.needs_layout_transition(current_layout)
    }

    pub fn needs_layout_transition(&self, current_layout: vk::ImageLayout) -> bool {
        current_layout != vk::ImageLayout::UNDEFINED
            && self.layout != vk::ImageLayout::UNDEFINED
            && self.layout != current_layout
    }
}

/// Two requests for the same resource within a single batch are compatible
/// iff at most one is a write and they don't ask for two distinct
/// non-`UNDEFINED` layouts.
pub fn reqs_compatible(a: &SyncReq, b: &SyncReq) -> bool {
    let a_is_write = a.access_mask.intersects(SyncReq::ALL_WRITES);
    let b_is_write = b.access_mask.intersects(SyncReq::ALL_WRITES);
    if a_is_write && b_is_write {
        return false;
    }
    let layouts_conflict = a.layout != vk::ImageLayout::UNDEFINED
        && b.layout != vk::ImageLayout::UNDEFINED
        && a.layout != b.layout;
    !layouts_conflict
}

/// Merges `b` into `a`, assuming `reqs_compatible(a, b)` was already
/// checked by the caller.
pub fn merge_reqs(a: &mut SyncReq, b: &SyncReq) {
    a.access_mask |= b.access_mask;
    a.stage_mask |= b.stage_mask;
    if a.layout == vk::ImageLayout::UNDEFINED {
        a.layout = b.layout;
    }
}
