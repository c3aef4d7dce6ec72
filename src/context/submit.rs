//! `submit_cmd_buffers`: submit-time patch-barrier reconciliation and the
//! swapchain present-layout transition, grounded on spec.md §4.C10
//! "Submit-time patch barriers" / "Swapchain-image presentation" and
//! §5 "Ordering" (patch buffers always immediately precede the user buffer
//! they cover).

use tracing::{instrument, trace};

use super::Context;
use crate::cmdbuf::CmdBufferState;
use crate::error::{GfxError, Result};
use crate::frame_token::FrameToken;
use crate::resources::CmdBufferId;
use crate::sync::patch_barriers;

#[cfg(feature = "vulkan")]
use ash::vk;
#[cfg(feature = "vulkan")]
use crate::sync::{Barrier, ResourceKey};

impl Context {
    /// Submits `bufs` in array order. Each user buffer may be preceded by
    /// an auxiliary patch-barrier buffer reconciling its assumptions about
    /// a resource's entry state against that resource's true global state;
    /// the final submit additionally transitions the acquired swapchain
    /// image to `PRESENT_SRC` if needed, then presents.
    #[instrument(skip(self, bufs), fields(ctx = self.id, n = bufs.len()))]
    pub fn submit_cmd_buffers(&mut self, token: FrameToken, bufs: &[CmdBufferId]) -> Result<()> {
        self.check_token(token)?;
        let slot = self.current_slot();

        for &id in bufs {
            let cb = self
                .cmd_buffers
                .get_mut(id)
                .ok_or_else(|| GfxError::invalid_operation("unknown command buffer"))?;
            cb.check_frame_token(token)?;
            // recording has no separate client-facing "finish" entry point
            // (spec.md §6.1 lists none): a buffer still `Recording` with no
            // open encoder finishes implicitly here, the same moment the
            // original ends it via `vkEndCommandBuffer` right before submit.
            if cb.state == CmdBufferState::Recording {
                cb.finish()?;
            }
            if cb.state != CmdBufferState::AwaitingSubmit {
                return Err(GfxError::invalid_operation(format!(
                    "command buffer is in state {:?}, expected AwaitingSubmit",
                    cb.state
                )));
            }
        }

        for (i, &id) in bufs.iter().enumerate() {
            let patches = {
                let cb = &self.cmd_buffers[id];
                patch_barriers(&cb.local_res_states, &mut self.global_sync_states)
            };
            if !patches.is_empty() {
                trace!(count = patches.len(), buf = i, "emitting patch barrier buffer");
                #[cfg(feature = "vulkan")]
                self.submit_patch_buffer(slot, &patches)?;
            }
            self.submit_one(slot, id)?;
        }

        #[cfg(feature = "vulkan")]
        if self.swapchain.is_some() {
            self.transition_swapchain_image_for_present(slot)?;
            self.present(slot)?;
        }

        for &id in bufs {
            self.frame_resources[slot].submitted_cmd_buffers.push(id);
            let cb = &mut self.cmd_buffers[id];
            cb.state = cb.state.mark_pending()?;
            cb.state = cb.state.mark_submitted()?;
        }
        Ok(())
    }

    /// Records and submits a `vkCmdPipelineBarrier`-only auxiliary command
    /// buffer for `patches`, allocated from this frame slot's superpool and
    /// retired like any other transient command buffer.
    #[cfg(feature = "vulkan")]
    fn submit_patch_buffer(&mut self, slot: usize, patches: &[(ResourceKey, Barrier)]) -> Result<()> {
        let device = self.device.clone();
        let queue = self.graphics_queue;
        let queue_family = self.graphics_queue_family;
        let cmd_pool_device = device.clone();
        let cmd_buf_device = device.clone();
        let handle = self.cmd_superpools[slot].allocate(
            || {
                let info = vk::CommandPoolCreateInfo::builder()
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT)
                    .queue_family_index(queue_family);
                unsafe { cmd_pool_device.create_command_pool(&info, None) }.map_err(GfxError::from)
            },
            |pool| {
                let info = vk::CommandBufferAllocateInfo::builder()
                    .command_pool(pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);
                let bufs = unsafe { cmd_buf_device.allocate_command_buffers(&info) }.map_err(GfxError::from)?;
                Ok(bufs[0])
            },
        )?;

        unsafe {
            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(handle, &begin_info).map_err(GfxError::from)?;
            for (_, barrier) in patches {
                record_single_barrier(&device, handle, barrier);
            }
            device.end_command_buffer(handle).map_err(GfxError::from)?;

            let submit = vk::SubmitInfo::builder().command_buffers(std::slice::from_ref(&handle));
            device
                .queue_submit(queue, std::slice::from_ref(&submit), vk::Fence::null())
                .map_err(GfxError::from)?;
        }
        Ok(())
    }

    /// Submits one already-recorded user command buffer.
    fn submit_one(&mut self, _slot: usize, id: CmdBufferId) -> Result<()> {
        #[cfg(feature = "vulkan")]
        {
            let device = self.device.clone();
            let queue = self.graphics_queue;
            let handle = self.cmd_buffers[id]
                .handle()
                .ok_or_else(|| GfxError::invalid_operation("command buffer has no backend handle"))?;
            let submit = vk::SubmitInfo::builder().command_buffers(std::slice::from_ref(&handle));
            unsafe {
                device.end_command_buffer(handle).map_err(GfxError::from)?;
                device
                    .queue_submit(queue, std::slice::from_ref(&submit), vk::Fence::null())
                    .map_err(GfxError::from)?;
            }
        }
        #[cfg(not(feature = "vulkan"))]
        let _ = id;
        Ok(())
    }

    /// Transitions the acquired swapchain image to `PRESENT_SRC` if its
    /// current layout isn't already that, waiting on whichever stage last
    /// wrote it, per spec.md §4.C10 "Swapchain-image presentation".
    #[cfg(feature = "vulkan")]
    fn transition_swapchain_image_for_present(&mut self, slot: usize) -> Result<()> {
        let image_id = {
            let swapchain = self.swapchain.as_ref().expect("checked by caller");
            swapchain.current_image()?.image
        };
        let key = self.images[image_id].identity_key();
        let global = self.global_sync_states.entry(key).or_insert_with(crate::sync::SyncState::default);
        if global.layout == vk::ImageLayout::PRESENT_SRC_KHR {
            return Ok(());
        }

        let req = crate::sync::SyncReq::new(vk::AccessFlags::empty(), vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .with_layout(vk::ImageLayout::PRESENT_SRC_KHR);
        let barrier = crate::sync::derive_barrier(global, &req);
        let Some(barrier) = barrier else { return Ok(()) };

        self.submit_patch_buffer(slot, &[(key, barrier)])
    }

    #[cfg(feature = "vulkan")]
    fn present(&mut self, slot: usize) -> Result<()> {
        let Some(swapchain) = &self.swapchain else { return Ok(()) };
        let Some(loader) = &self.swapchain_loader else {
            return Err(GfxError::invalid_operation("swapchain has no loader installed"));
        };
        let Some(image_index) = swapchain.current_image_index else {
            return Err(GfxError::invalid_operation("no swapchain image acquired this frame"));
        };
        let wait_semaphores = [self.frame_resources[slot].render_finished];
        let swapchains = [swapchain.handle];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { loader.queue_present(self.graphics_queue, &present_info) } {
            Ok(_suboptimal) => Ok(()),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GfxError::invalid_operation(
                "swapchain out of date at present; resize_context is required",
            )),
            Err(e) => Err(GfxError::from(e)),
        }
    }
}

/// Patch buffers carry no `vk::Image` handle of their own (the sync engine
/// only ever tracks state, keyed by identity hash, not ownership), so a
/// global memory barrier is emitted here; per-resource image barriers with
/// a real `vk::Image` and subresource range are issued inline by the
/// encoder that owns the image (see `context::encoders`).
#[cfg(feature = "vulkan")]
fn record_single_barrier(device: &ash::Device, cmd: vk::CommandBuffer, barrier: &crate::sync::Barrier) {
    let mem_barrier = vk::MemoryBarrier::builder()
        .src_access_mask(barrier.src_access_mask)
        .dst_access_mask(barrier.dst_access_mask);
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            barrier.src_stage_mask,
            barrier.dst_stage_mask,
            vk::DependencyFlags::empty(),
            std::slice::from_ref(&mem_barrier),
            &[],
            &[],
        );
    }
}
