//! Command buffers: the state machine of §4.C11 plus the per-buffer
//! bookkeeping the sync engine (§4.C10) and the deferred render-command
//! recorder (§4.C9) need — local resource states, pending barriers, and
//! (while a render pass is open) the deferred command stream.
//!
//! The encoder operations themselves (`bind_gfx_pipeline`, `draw`,
//! `dispatch`, the transfer ops, ...) live on [`crate::context::Context`],
//! which is the natural owner of the resource tables, the render-pass
//! cache and the pools an encoder call needs to consult; this module only
//! holds the state a single command buffer carries across its recording.

pub mod render_cmd;
pub mod state;

use fnv::FnvHashMap;
use smallvec::SmallVec;

use crate::error::{GfxError, Result};
use crate::frame_token::FrameToken;
use crate::pools::CommandBufferHandle;
use crate::sync::{Barrier, LocalSyncState, ResourceKey};

pub use render_cmd::{
    BindOpsRange, BindPayload, IndexType, RenderCmd, RenderCmdStream, ResourceBindOp, Scissor, Viewport, INLINE_BIND_OPS,
};
pub use state::CmdBufferState;

/// Which kind of encoder is currently open on a command buffer. Only one
/// may be open at a time; nesting (e.g. beginning a render pass inside a
/// compute pass) is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Render,
    Compute,
    Transfer,
}

pub struct CommandBuffer {
    pub state: CmdBufferState,
    pub frame_token: Option<FrameToken>,
    pub active_encoder: Option<EncoderKind>,

    /// Per-resource state as touched so far in this recording; consulted
    /// and updated by every sync-req batch commit, and read back at submit
    /// time to derive patch barriers (§4.C10).
    pub local_res_states: FnvHashMap<ResourceKey, LocalSyncState>,
    /// Barriers derived but not yet flushed into the backend command
    /// buffer via a single `vkCmdPipelineBarrier`.
    pub pending_barriers: Vec<Barrier>,

    /// Only populated while a render pass encoder is open.
    pub render_stream: RenderCmdStream,
    /// Bind ops accumulated against the active compute pipeline, flushed
    /// at `dispatch` the same way render passes flush at `draw` — compute
    /// passes are not deferred-recorded, so this list alone is enough
    /// (there is no cross-pipeline binding ambiguity to resolve).
    pub pending_compute_binds: SmallVec<[ResourceBindOp; INLINE_BIND_OPS]>,
    pub active_compute_pipeline: Option<crate::resources::ComputePipelineId>,

    /// Captured by `cmd_begin_render_pass`, consumed at `cmd_end_render_pass`.
    pub active_render_pass: Option<crate::context::encoders::ActiveRenderPass>,

    pub(crate) handle: Option<CommandBufferHandle>,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self {
            state: CmdBufferState::New,
            frame_token: None,
            active_encoder: None,
            local_res_states: FnvHashMap::default(),
            pending_barriers: Vec::new(),
            render_stream: RenderCmdStream::new(),
            pending_compute_binds: SmallVec::new(),
            active_compute_pipeline: None,
            active_render_pass: None,
            handle: None,
        }
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `start_cmd_buffer`: begins recording for `token`, binding this
    /// buffer to exactly one frame for its entire recording life.
    pub fn start(&mut self, token: FrameToken, handle: CommandBufferHandle) -> Result<()> {
        self.state = self.state.begin()?;
        self.frame_token = Some(token);
        self.handle = Some(handle);
        self.local_res_states.clear();
        self.pending_barriers.clear();
        self.active_compute_pipeline = None;
        self.active_render_pass = None;
        Ok(())
    }

    /// Ends recording; rejected while an encoder pass is still open.
    pub fn finish(&mut self) -> Result<()> {
        self.state = self.state.finish(self.active_encoder.is_some())?;
        Ok(())
    }

    pub fn begin_encoder(&mut self, kind: EncoderKind) -> Result<()> {
        if self.state != CmdBufferState::Recording {
            return Err(GfxError::invalid_operation(
                "cannot begin an encoder on a command buffer that isn't recording",
            ));
        }
        if self.active_encoder.is_some() {
            return Err(GfxError::invalid_operation(
                "an encoder is already active on this command buffer",
            ));
        }
        self.active_encoder = Some(kind);
        if kind == EncoderKind::Render {
            self.render_stream.clear();
        }
        Ok(())
    }

    pub fn end_encoder(&mut self, kind: EncoderKind) -> Result<()> {
        match self.active_encoder {
            Some(active) if active == kind => {
                self.active_encoder = None;
                Ok(())
            }
            _ => Err(GfxError::invalid_operation(format!(
                "cannot end a {kind:?} encoder: no matching encoder is active"
            ))),
        }
    }

    /// Verifies this buffer belongs to `token` before an operation that
    /// requires it (submit, end-frame); a mismatch is fatal per spec.md
    /// §4.C1.
    pub fn handle(&self) -> Option<CommandBufferHandle> {
        self.handle
    }

    pub fn check_frame_token(&self, token: FrameToken) -> Result<()> {
        match self.frame_token {
            Some(t) if t == token => Ok(()),
            Some(_) => Err(GfxError::invalid_operation("command buffer frame token mismatch")),
            None => Err(GfxError::invalid_operation("command buffer was never started")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> FrameToken {
        FrameToken::encode(1, 2, 0)
    }

    #[test]
    fn cannot_end_render_pass_without_a_matching_begin() {
        let mut buf = CommandBuffer::new();
        assert!(buf.end_encoder(EncoderKind::Render).is_err());
    }

    #[test]
    fn cannot_begin_an_encoder_before_recording_starts() {
        let mut buf = CommandBuffer::new();
        assert!(buf.begin_encoder(EncoderKind::Render).is_err());
    }

    #[test]
    fn nested_encoders_are_rejected() {
        let mut buf = CommandBuffer::new();
        buf.state = buf.state.recycle().unwrap();
        buf.start(token(), 1).unwrap();
        buf.begin_encoder(EncoderKind::Render).unwrap();
        assert!(buf.begin_encoder(EncoderKind::Compute).is_err());
    }

    #[test]
    fn finish_rejected_while_pass_is_open() {
        let mut buf = CommandBuffer::new();
        buf.state = buf.state.recycle().unwrap();
        buf.start(token(), 1).unwrap();
        buf.begin_encoder(EncoderKind::Transfer).unwrap();
        assert!(buf.finish().is_err());
        buf.end_encoder(EncoderKind::Transfer).unwrap();
        assert!(buf.finish().is_ok());
    }

    #[test]
    fn frame_token_mismatch_is_rejected() {
        let mut buf = CommandBuffer::new();
        buf.state = buf.state.recycle().unwrap();
        buf.start(token(), 1).unwrap();
        let other = FrameToken::encode(1, 2, 1);
        assert!(buf.check_frame_token(other).is_err());
        assert!(buf.check_frame_token(token()).is_ok());
    }
}
