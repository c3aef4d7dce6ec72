//! `create_cmd_buffer`/`destroy_cmd_buffer`/`start_cmd_buffer`, grounded on
//! spec.md §6.1 "Command buffers" and `ngf_create_cmd_buffer`/
//! `ngfvk_cmd_buffer_start` in `original_source/source/ngf-vk/impl.c`.

use tracing::instrument;

use super::Context;
use crate::cmdbuf::{CmdBufferState, CommandBuffer};
use crate::error::{GfxError, Result};
use crate::frame_token::FrameToken;
use crate::resources::CmdBufferId;

#[cfg(feature = "vulkan")]
use ash::vk;

impl Context {
    /// Allocates a new, empty command buffer, ready to `start_cmd_buffer`.
    /// The backend command-buffer handle isn't assigned until then, pulled
    /// from the current frame slot's superpool.
    pub fn create_cmd_buffer(&mut self) -> CmdBufferId {
        let mut cb = CommandBuffer::new();
        cb.state = cb.state.recycle().expect("a freshly constructed command buffer is always recyclable");
        self.cmd_buffers.insert(cb)
    }

    /// Destroys a command buffer immediately; rejected while it's in a
    /// state where the backend might still reference it (its backend
    /// handle, if any, belongs to a superpool and is reclaimed by that
    /// pool's own reset, not by this call).
    pub fn destroy_cmd_buffer(&mut self, id: CmdBufferId) -> Result<()> {
        let cb = self
            .cmd_buffers
            .get(id)
            .ok_or_else(|| GfxError::invalid_operation("unknown command buffer"))?;
        if matches!(cb.state, CmdBufferState::Recording | CmdBufferState::AwaitingSubmit | CmdBufferState::Pending) {
            return Err(GfxError::invalid_operation(format!(
                "cannot destroy a command buffer in state {:?}",
                cb.state
            )));
        }
        self.cmd_buffers.remove(id);
        Ok(())
    }

    /// `start_cmd_buffer`: allocates a backend command buffer from the
    /// current frame slot's command superpool (lazily creating the pool on
    /// first use) and begins recording.
    #[instrument(skip(self), fields(ctx = self.id))]
    pub fn start_cmd_buffer(&mut self, id: CmdBufferId, token: FrameToken) -> Result<()> {
        self.check_token(token)?;
        let slot = self.current_slot();

        #[cfg(feature = "vulkan")]
        let handle = {
            let device = self.device.clone();
            let queue_family = self.graphics_queue_family;
            let pool_device = device.clone();
            let buf_device = device.clone();
            let begin_device = device.clone();
            let handle = self.cmd_superpools[slot].allocate(
                || {
                    let info = vk::CommandPoolCreateInfo::builder()
                        .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                        .queue_family_index(queue_family);
                    unsafe { pool_device.create_command_pool(&info, None) }.map_err(GfxError::from)
                },
                |pool| {
                    let info = vk::CommandBufferAllocateInfo::builder()
                        .command_pool(pool)
                        .level(vk::CommandBufferLevel::PRIMARY)
                        .command_buffer_count(1);
                    let bufs = unsafe { buf_device.allocate_command_buffers(&info) }.map_err(GfxError::from)?;
                    Ok(bufs[0])
                },
            )?;
            let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { begin_device.begin_command_buffer(handle, &begin_info) }.map_err(GfxError::from)?;
            handle
        };
        #[cfg(not(feature = "vulkan"))]
        let handle = 0u64;

        let cb = self
            .cmd_buffers
            .get_mut(id)
            .ok_or_else(|| GfxError::invalid_operation("unknown command buffer"))?;
        cb.start(token, handle)
    }
}

// `create_cmd_buffer`/`start_cmd_buffer` need a live backend command pool,
// so the state-machine transitions they drive are instead covered against
// a bare `CommandBuffer` in `cmdbuf::tests`.
