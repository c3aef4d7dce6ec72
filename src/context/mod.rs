//! The context: owns the frame-resource ring, default render target,
//! swapchain, superpools, resource tables and the sync engine's global
//! state, and orchestrates `begin_frame`/`end_frame`, grounded on
//! spec.md §4.C12 and §3 "Ownership".

pub mod cmdbuf_api;
pub mod encoders;
pub mod frame;
pub mod resources_api;
pub mod submit;
pub mod swapchain_api;

use fnv::FnvHashMap;
use slotmap::SlotMap;

use crate::alloc::{frame_store, reset_frame_store, reset_tmp_store};
use crate::cmdbuf::CommandBuffer;
use crate::error::{GfxError, Result};
use crate::frame_token::FrameToken;
use crate::pools::{CommandSuperpool, DescriptorSuperpool};
use crate::render_pass_cache::RenderPassCache;
use crate::resources::*;
use crate::retire::RetireQueue;
use crate::swapchain::Swapchain;
use crate::sync::{ResourceKey, SyncState};

#[cfg(feature = "vulkan")]
use ash::vk;

/// Per-frame-slot state: one semaphore, one or more fences, the list of
/// command buffers submitted this cycle, and (via the context's parallel
/// `retire_queues` vec) the deferred-destruction objects waiting on this
/// slot's fences.
pub struct FrameResource {
    #[cfg(feature = "vulkan")]
    pub image_available: vk::Semaphore,
    #[cfg(feature = "vulkan")]
    pub render_finished: vk::Semaphore,
    #[cfg(feature = "vulkan")]
    pub in_flight_fence: vk::Fence,
    pub submitted_cmd_buffers: Vec<CmdBufferId>,
    /// Set once this slot's work has actually been submitted at least
    /// once; `begin_frame` only waits on fences for slots that are.
    pub fence_armed: bool,
}

pub struct Context {
    pub id: u16,
    pub max_inflight_frames: u8,
    pub frame_id: u8,

    pub frame_resources: Vec<FrameResource>,
    pub cmd_superpools: Vec<CommandSuperpool>,
    pub desc_superpools: Vec<DescriptorSuperpool>,
    pub retire_queues: Vec<RetireQueue>,

    pub buffers: SlotMap<BufferId, Buffer>,
    pub images: SlotMap<ImageId, Image>,
    pub image_views: SlotMap<ImageViewId, ImageView>,
    pub samplers: SlotMap<SamplerId, Sampler>,
    pub shader_modules: SlotMap<ShaderModuleId, ShaderModule>,
    pub texel_buffer_views: SlotMap<TexelBufferViewId, TexelBufferView>,
    pub render_targets: SlotMap<RenderTargetId, RenderTarget>,
    pub graphics_pipelines: SlotMap<GraphicsPipelineId, GraphicsPipeline>,
    pub compute_pipelines: SlotMap<ComputePipelineId, ComputePipeline>,
    pub cmd_buffers: SlotMap<CmdBufferId, CommandBuffer>,

    pub render_pass_cache: RenderPassCache,
    /// Global sync state visible to not-yet-submitted work (spec.md §3
    /// "Invariants"), keyed by the resource's identity hash.
    pub global_sync_states: FnvHashMap<ResourceKey, SyncState>,

    pub default_render_target: RenderTargetId,
    pub swapchain: Option<Swapchain>,

    #[cfg(feature = "vulkan")]
    pub(crate) instance: ash::Instance,
    #[cfg(feature = "vulkan")]
    pub(crate) physical_device: vk::PhysicalDevice,
    #[cfg(feature = "vulkan")]
    pub(crate) device: ash::Device,
    #[cfg(feature = "vulkan")]
    pub(crate) gpu_alloc: std::sync::Arc<crate::gpu_alloc::GpuAllocator>,
    /// Cached alongside `device` rather than looked up again per
    /// `begin_frame`/`resize_context` call.
    #[cfg(feature = "vulkan")]
    pub(crate) swapchain_loader: Option<ash::extensions::khr::Swapchain>,
    #[cfg(feature = "vulkan")]
    pub(crate) surface_loader: ash::extensions::khr::Surface,
    /// The window-system surface this context presents to, `None` for a
    /// headless (off-screen) context with no swapchain.
    #[cfg(feature = "vulkan")]
    pub(crate) surface: Option<vk::SurfaceKHR>,
    /// The single queue this context submits to; single-threaded
    /// cooperative scheduling (spec.md §5) means one queue per context is
    /// sufficient — no cross-queue ownership transfers to reason about.
    #[cfg(feature = "vulkan")]
    pub(crate) graphics_queue: vk::Queue,
    #[cfg(feature = "vulkan")]
    pub(crate) graphics_queue_family: u32,
}

pub struct ContextInfo {
    pub max_inflight_frames: u8,
    pub swapchain: Option<crate::swapchain::SwapchainInfo>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u16,
        info: &ContextInfo,
        #[cfg(feature = "vulkan")] instance: ash::Instance,
        #[cfg(feature = "vulkan")] physical_device: vk::PhysicalDevice,
        #[cfg(feature = "vulkan")] device: ash::Device,
        #[cfg(feature = "vulkan")] gpu_alloc: std::sync::Arc<crate::gpu_alloc::GpuAllocator>,
        #[cfg(feature = "vulkan")] surface_loader: ash::extensions::khr::Surface,
        #[cfg(feature = "vulkan")] surface: Option<vk::SurfaceKHR>,
        #[cfg(feature = "vulkan")] graphics_queue: vk::Queue,
        #[cfg(feature = "vulkan")] graphics_queue_family: u32,
    ) -> Result<Self> {
        if info.max_inflight_frames == 0 {
            return Err(GfxError::invalid_size("max_inflight_frames must be at least 1"));
        }
        let n = info.max_inflight_frames as usize;

        #[cfg(feature = "vulkan")]
        let frame_resources = (0..n).map(|_| FrameResource::new(&device)).collect::<Result<Vec<_>>>()?;
        #[cfg(not(feature = "vulkan"))]
        let frame_resources = (0..n).map(|_| FrameResource::new()).collect();

        // every context, headless or presenting, has a default render
        // target to draw into; a swapchain-backed context immediately
        // overwrites its attachments/images (`swapchain_api::create_swapchain`),
        // a headless one leaves it to `create_render_target`-style
        // population by the caller via `resize_context`/manual setup.
        let mut render_targets = SlotMap::with_key();
        let default_render_target = render_targets.insert(RenderTarget {
            info: RenderTargetInfo { attachments: Default::default(), images: Vec::new(), width: 0, height: 0 },
            compat_key: crate::resources::render_target::RenderPassCompatKey::default(),
            is_default: true,
            #[cfg(feature = "vulkan")]
            framebuffers: Vec::new(),
        });

        Ok(Self {
            id,
            max_inflight_frames: info.max_inflight_frames,
            frame_id: 0,
            frame_resources,
            cmd_superpools: (0..n).map(|_| CommandSuperpool::new()).collect(),
            desc_superpools: (0..n).map(|_| DescriptorSuperpool::new()).collect(),
            retire_queues: (0..n).map(|_| RetireQueue::new()).collect(),
            buffers: SlotMap::with_key(),
            images: SlotMap::with_key(),
            image_views: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            shader_modules: SlotMap::with_key(),
            texel_buffer_views: SlotMap::with_key(),
            render_targets,
            graphics_pipelines: SlotMap::with_key(),
            compute_pipelines: SlotMap::with_key(),
            cmd_buffers: SlotMap::with_key(),
            render_pass_cache: RenderPassCache::new(),
            global_sync_states: FnvHashMap::default(),
            default_render_target,
            swapchain: None,
            #[cfg(feature = "vulkan")]
            instance,
            #[cfg(feature = "vulkan")]
            physical_device,
            #[cfg(feature = "vulkan")]
            device,
            #[cfg(feature = "vulkan")]
            gpu_alloc,
            #[cfg(feature = "vulkan")]
            swapchain_loader: None,
            #[cfg(feature = "vulkan")]
            surface_loader,
            #[cfg(feature = "vulkan")]
            surface,
            #[cfg(feature = "vulkan")]
            graphics_queue,
            #[cfg(feature = "vulkan")]
            graphics_queue_family,
        })
    }

    /// Installs the `VK_KHR_swapchain` device-extension loader used by
    /// `begin_frame`'s image acquisition; set once, right after the
    /// swapchain itself is created (see `swapchain_api::create_swapchain`).
    #[cfg(feature = "vulkan")]
    pub(crate) fn set_swapchain_loader(&mut self, loader: ash::extensions::khr::Swapchain) {
        self.swapchain_loader = Some(loader);
    }

    pub fn current_slot(&self) -> usize {
        self.frame_id as usize % self.max_inflight_frames as usize
    }

    pub fn default_render_target(&self) -> RenderTargetId {
        self.default_render_target
    }

    /// The attachment descriptions of the default render target, used by
    /// callers building a compatible graphics pipeline without otherwise
    /// needing to look the render target up themselves.
    pub fn default_render_target_attachment_descs(&self) -> &[crate::resources::AttachmentDesc] {
        &self.render_targets[self.default_render_target].info.attachments
    }
}

impl FrameResource {
    #[cfg(feature = "vulkan")]
    fn new(device: &ash::Device) -> Result<Self> {
        let sem_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder();
        unsafe {
            Ok(Self {
                image_available: device.create_semaphore(&sem_info, None).map_err(GfxError::from)?,
                render_finished: device.create_semaphore(&sem_info, None).map_err(GfxError::from)?,
                in_flight_fence: device.create_fence(&fence_info, None).map_err(GfxError::from)?,
                submitted_cmd_buffers: Vec::new(),
                fence_armed: false,
            })
        }
    }

    #[cfg(not(feature = "vulkan"))]
    fn new() -> Self {
        Self {
            submitted_cmd_buffers: Vec::new(),
            fence_armed: false,
        }
    }
}
