//! The central barrier-derivation routine: given a resource's current
//! `SyncState` and a pending `SyncReq`, decide whether a barrier is needed
//! and update the state to reflect the request.
//!
//! Ported faithfully from `ngfvk_sync_barrier` in
//! `original_source/source/ngf-vk/impl.c`; this is the one routine the
//! whole sync engine exists to run correctly.

#[cfg(feature = "vulkan")]
use ash::vk;
#[cfg(not(feature = "vulkan"))]
use super::flags as vk;

use super::stage::{stage_access_bits, stage_mask_bits, Stage};
use super::state::{AccessStages, SyncReq, SyncState};

/// A single pipeline barrier to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub src_stage_mask: vk::PipelineStageFlags,
    pub src_access_mask: vk::AccessFlags,
    pub dst_stage_mask: vk::PipelineStageFlags,
    pub dst_access_mask: vk::AccessFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

/// Derives the barrier (if any) needed to satisfy `req` given `state`, and
/// mutates `state` to reflect `req` having been satisfied. `req_stage`, used
/// to index `per_stage_readers_mask`, is derived from `req.stage_mask`
/// (a request may span more than one `Stage`; each is checked/updated in
/// turn, but only one barrier — covering all stages that still need one —
/// is emitted for the whole request).
pub fn derive_barrier(state: &mut SyncState, req: &SyncReq) -> Option<Barrier> {
    let need_layout_transition = req.needs_layout_transition(state.layout);
    let need_write = req.wants_write(state.layout);

    let barrier = if !need_write {
        read_only_request(state, req, need_layout_transition)
    } else {
        writing_request(state, req, need_layout_transition)
    };

    if req.layout != vk::ImageLayout::UNDEFINED {
        state.layout = req.layout;
    }
    barrier
}

fn read_only_request(
    state: &mut SyncState,
    req: &SyncReq,
    need_layout_transition: bool,
) -> Option<Barrier> {
    let req_stages: Vec<Stage> = Stage::from_flags(req.stage_mask).collect();

    let already_seen = !need_layout_transition
        && req_stages.iter().all(|&stage| {
            let req_bits = stage_access_bits(stage, req.access_mask);
            let seen_bits = stage_mask_bits(state.per_stage_readers_mask, stage);
            req_bits & seen_bits == req_bits
        });

    let barrier = if already_seen {
        None
    } else if !state.last_writer.is_empty() || need_layout_transition {
        Some(Barrier {
            src_stage_mask: default_if_empty(state.last_writer.stage_mask),
            src_access_mask: state.last_writer.access_mask,
            dst_stage_mask: req.stage_mask,
            dst_access_mask: req.access_mask,
            old_layout: state.layout,
            new_layout: if req.layout != vk::ImageLayout::UNDEFINED {
                req.layout
            } else {
                state.layout
            },
        })
    } else {
        None
    };

    state.active_readers.merge(AccessStages {
        access_mask: req.access_mask,
        stage_mask: req.stage_mask,
    });
    for stage in req_stages {
        let bits = stage_access_bits(stage, req.access_mask);
        let merged = stage_mask_bits(state.per_stage_readers_mask, stage) | bits;
        super::stage::set_stage_mask_bits(&mut state.per_stage_readers_mask, stage, merged);
    }

    barrier
}

fn writing_request(
    state: &mut SyncState,
    req: &SyncReq,
    need_layout_transition: bool,
) -> Option<Barrier> {
    let src = if !state.active_readers.is_empty() {
        state.active_readers
    } else {
        state.last_writer
    };

    let barrier = if src.is_empty() && !need_layout_transition {
        None
    } else {
        Some(Barrier {
            src_stage_mask: default_if_empty(src.stage_mask),
            src_access_mask: src.access_mask,
            dst_stage_mask: req.stage_mask,
            dst_access_mask: req.access_mask,
            old_layout: state.layout,
            new_layout: if req.layout != vk::ImageLayout::UNDEFINED {
                req.layout
            } else {
                state.layout
            },
        })
    };

    state.active_readers = AccessStages::default();
    state.per_stage_readers_mask = 0;
    state.last_writer = AccessStages {
        access_mask: req.access_mask,
        stage_mask: req.stage_mask,
    };

    let req_is_actually_read_only = !req.access_mask.intersects(SyncReq::ALL_WRITES);
    if req_is_actually_read_only {
        // the request only needed a layout transition; the transition
        // itself makes it visible, so re-register it as a reader too.
        state.active_readers.merge(AccessStages {
            access_mask: req.access_mask,
            stage_mask: req.stage_mask,
        });
        for stage in Stage::from_flags(req.stage_mask) {
            let bits = stage_access_bits(stage, req.access_mask);
            super::stage::set_stage_mask_bits(&mut state.per_stage_readers_mask, stage, bits);
        }
    }

    barrier
}

fn default_if_empty(stage_mask: vk::PipelineStageFlags) -> vk::PipelineStageFlags {
    if stage_mask.is_empty() {
        vk::PipelineStageFlags::BOTTOM_OF_PIPE
    } else {
        stage_mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::{AccessFlags as A, ImageLayout as L, PipelineStageFlags as S};

    fn buffer_req(access: A, stage: S) -> SyncReq {
        SyncReq::new(access, stage)
    }

    #[test]
    fn redundant_reads_produce_no_further_barriers() {
        let mut state = SyncState::new_buffer();
        let req = buffer_req(A::SHADER_READ, S::FRAGMENT_SHADER);
        let first = derive_barrier(&mut state, &req);
        assert!(first.is_none(), "no prior writer, nothing to synchronize against");
        for _ in 0..5 {
            assert!(derive_barrier(&mut state, &req).is_none());
        }
    }

    #[test]
    fn write_read_write_emits_exactly_two_barriers() {
        let mut state = SyncState::new_buffer();
        let write1 = buffer_req(A::TRANSFER_WRITE, S::TRANSFER);
        let read = buffer_req(A::VERTEX_ATTRIBUTE_READ, S::VERTEX_INPUT);
        let write2 = buffer_req(A::TRANSFER_WRITE, S::TRANSFER);

        let b1 = derive_barrier(&mut state, &write1);
        assert!(b1.is_none(), "first writer needs nothing to wait on");

        let b2 = derive_barrier(&mut state, &read).expect("read must wait on the prior write");
        assert_eq!(b2.src_access_mask, A::TRANSFER_WRITE);
        assert_eq!(b2.dst_stage_mask, S::VERTEX_INPUT);

        let b3 = derive_barrier(&mut state, &write2).expect("second write must wait on the read");
        assert_eq!(b3.src_stage_mask, S::VERTEX_INPUT);
        assert_eq!(b3.dst_access_mask, A::TRANSFER_WRITE);
    }

    #[test]
    fn layout_transition_then_sample_emits_one_barrier() {
        let mut state = SyncState::new_image(L::UNDEFINED);
        let attach = SyncReq::new(A::COLOR_ATTACHMENT_WRITE, S::COLOR_ATTACHMENT_OUTPUT)
            .with_layout(L::COLOR_ATTACHMENT_OPTIMAL);
        let sample =
            SyncReq::new(A::SHADER_READ, S::FRAGMENT_SHADER).with_layout(L::SHADER_READ_ONLY_OPTIMAL);

        let b1 = derive_barrier(&mut state, &attach);
        assert!(b1.is_none(), "undefined -> color attachment needs no wait");
        assert_eq!(state.layout, L::COLOR_ATTACHMENT_OPTIMAL);

        let b2 = derive_barrier(&mut state, &sample).expect("layout differs, must transition");
        assert_eq!(b2.old_layout, L::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(b2.new_layout, L::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(state.layout, L::SHADER_READ_ONLY_OPTIMAL);

        assert!(derive_barrier(&mut state, &sample).is_none(), "same read again needs nothing more");
    }
}
