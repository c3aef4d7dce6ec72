//! The deferred render-command stream, grounded on spec.md §4.C9.
//!
//! Between `cmd_begin_render_pass` and `cmd_end_render_pass` the engine does
//! not record backend commands directly: each call appends a tagged
//! [`RenderCmd`] to a stream owned by the command buffer. At
//! `cmd_end_render_pass` the stream is scanned once to compute the pass's
//! full sync-req batch, then replayed against the real backend command
//! buffer, resolving pending descriptor binds into `vkCmdBindDescriptorSets`
//! calls only at each `Draw`.

use smallvec::SmallVec;

use crate::resources::shader::DescriptorType;
use crate::resources::{BufferId, GraphicsPipelineId, ImageId, SamplerId, TexelBufferViewId};

/// Inline capacity for a render pass's deferred command stream — enough
/// for a typical pass's worth of binds/draws before spilling to the heap.
const INLINE_RENDER_CMDS: usize = 32;
/// Inline capacity for the bind-ops-range index — one entry per pipeline
/// switch within a pass, which is almost always a handful.
const INLINE_BIND_RANGES: usize = 8;

/// Inline capacity for a single draw/dispatch's accumulated bind ops —
/// matches the handful of bindings a typical descriptor set declares.
pub const INLINE_BIND_OPS: usize = 8;

/// A deferred descriptor write targeting `(set, binding, array_index)`,
/// grounded on spec.md §6.3.
#[derive(Debug, Clone, Copy)]
pub struct ResourceBindOp {
    pub target_set: u32,
    pub target_binding: u32,
    pub array_index: u32,
    pub descriptor_type: DescriptorType,
    pub payload: BindPayload,
}

#[derive(Debug, Clone, Copy)]
pub enum BindPayload {
    BufferSlice { buffer: BufferId, offset: u64, range: u64 },
    ImageSampler { image: ImageId, sampler: Option<SamplerId>, is_view: bool },
    TexelBufferView(TexelBufferViewId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scissor {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Uint16,
    Uint32,
}

/// One record in the deferred in-pass command stream.
#[derive(Debug, Clone, Copy)]
pub enum RenderCmd {
    BindPipeline(GraphicsPipelineId),
    SetViewport(Viewport),
    SetScissor(Scissor),
    SetStencilReference(u32),
    SetStencilCompareMask(u32),
    SetStencilWriteMask(u32),
    BindResource(ResourceBindOp),
    BindAttribBuffer { buffer: BufferId, binding: u32, offset: u64 },
    BindIndexBuffer { buffer: BufferId, offset: u64, index_type: IndexType },
    SetDepthBias { constant: f32, slope: f32, clamp: f32 },
    Draw { indexed: bool, first: u32, count: u32, instance_count: u32 },
}

/// A half-open range `[start, end)` into the `RenderCmd` stream covering
/// the `BindResource`/`BindAttribBuffer`/`BindIndexBuffer` ops accumulated
/// against one bound pipeline, since `virt_bind_ops_ranges` indexes the
/// stream rather than duplicating its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindOpsRange {
    pub pipeline: GraphicsPipelineId,
    pub start: usize,
    pub end: usize,
}

/// The deferred command stream plus the bind-ops-range index scanned out
/// of it. Owned by a command buffer for the lifetime of one render pass.
#[derive(Default)]
pub struct RenderCmdStream {
    pub cmds: SmallVec<[RenderCmd; INLINE_RENDER_CMDS]>,
    pub bind_ranges: SmallVec<[BindOpsRange; INLINE_BIND_RANGES]>,
    current_pipeline: Option<GraphicsPipelineId>,
    current_range_start: usize,
}

impl RenderCmdStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command. A `BindPipeline` closes out the in-progress
    /// bind-ops range (recording which pipeline's layout governs every
    /// bind op recorded since the previous `BindPipeline`) before opening
    /// a new one — bind ops accumulated against pipeline A that no draw
    /// has yet consumed are still attributed to A once B is bound, because
    /// only A knows the layout for them.
    pub fn push(&mut self, cmd: RenderCmd) {
        if let RenderCmd::BindPipeline(next) = cmd {
            self.close_current_range();
            self.current_pipeline = Some(next);
            self.current_range_start = self.cmds.len() + 1;
        }
        self.cmds.push(cmd);
    }

    fn close_current_range(&mut self) {
        if let Some(pipeline) = self.current_pipeline {
            let end = self.cmds.len();
            if self.current_range_start < end {
                self.bind_ranges.push(BindOpsRange { pipeline, start: self.current_range_start, end });
            }
        }
    }

    /// Closes out the final open bind-ops range. Must be called once
    /// recording for the pass is done and before `all_bind_ops`/replay
    /// consult `bind_ranges`.
    pub fn finalize(&mut self) {
        self.close_current_range();
        self.current_pipeline = None;
    }

    pub fn clear(&mut self) {
        self.cmds.clear();
        self.bind_ranges.clear();
        self.current_pipeline = None;
        self.current_range_start = 0;
    }

    /// Every `ResourceBindOp` referenced anywhere in the stream, the
    /// inputs to computing the pass's sync-req batch at
    /// `cmd_end_render_pass`.
    pub fn all_bind_ops(&self) -> impl Iterator<Item = &ResourceBindOp> {
        self.cmds.iter().filter_map(|c| match c {
            RenderCmd::BindResource(op) => Some(op),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::GraphicsPipelineId;

    fn pid(n: u64) -> GraphicsPipelineId {
        let mut sm: slotmap::SlotMap<GraphicsPipelineId, ()> = slotmap::SlotMap::with_key();
        let mut last = sm.insert(());
        for _ in 0..n {
            last = sm.insert(());
        }
        last
    }

    #[test]
    fn bind_ops_survive_across_a_pipeline_switch_without_a_draw() {
        let mut stream = RenderCmdStream::new();
        let p1 = pid(0);
        stream.push(RenderCmd::BindPipeline(p1));
        stream.push(RenderCmd::SetViewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: 800.0,
            height: 600.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }));
        let p2 = pid(1);
        stream.push(RenderCmd::BindPipeline(p2));
        stream.push(RenderCmd::Draw { indexed: false, first: 0, count: 3, instance_count: 1 });
        stream.finalize();

        assert_eq!(stream.bind_ranges.len(), 2, "both pipeline groups should be indexed");
        assert_eq!(stream.bind_ranges[0].pipeline, p1);
        assert_eq!(stream.bind_ranges[1].pipeline, p2);
    }

    #[test]
    fn clear_resets_everything() {
        let mut stream = RenderCmdStream::new();
        stream.push(RenderCmd::BindPipeline(pid(0)));
        stream.push(RenderCmd::Draw { indexed: true, first: 0, count: 6, instance_count: 1 });
        stream.clear();
        assert!(stream.cmds.is_empty());
        assert!(stream.bind_ranges.is_empty());
    }
}
