//! Swapchain images, the default render target's framebuffers, and the
//! optional eagerly-created depth/multisample-color targets, grounded on
//! spec.md §3 "Invariants" ("Swapchain depth and multisample color targets
//! exist iff declared in swapchain-info...") and §4.C12, plus
//! `ngfvk_create_swapchain` in `original_source/source/ngf-vk/impl.c` for
//! the present-mode/format negotiation this module's `create` performs.
//!
//! Surface creation itself is out of scope (spec.md §1 "Platform surface
//! creation... specified only at their interfaces") — `SwapchainInfo`
//! takes an already-created `VkSurfaceKHR`, the collaborator's output.

use crate::error::{GfxError, Result};
use crate::resources::{ImageId, RenderTargetId};

#[cfg(feature = "vulkan")]
use ash::vk;

#[cfg(feature = "vulkan")]
pub type Format = vk::Format;
#[cfg(not(feature = "vulkan"))]
pub type Format = u32;

#[cfg(feature = "vulkan")]
pub type SurfaceHandle = vk::SurfaceKHR;
#[cfg(not(feature = "vulkan"))]
pub type SurfaceHandle = u64;

#[derive(Debug, Clone, Copy)]
pub struct SwapchainInfo {
    pub surface: SurfaceHandle,
    pub width: u32,
    pub height: u32,
    pub color_format: Format,
    pub present_mode_vsync: bool,
    /// `Some` iff the context wants an eagerly-created depth attachment
    /// alongside the presentable color images.
    pub depth_format: Option<Format>,
    /// `Some(sample_count)` iff a multisampled color target should be
    /// created and resolved into the presentable image each frame.
    pub sample_count: Option<u32>,
    /// Requested number of presentable images; clamped to the surface's
    /// supported range at creation time.
    pub capacity_hint: u32,
}

/// One presentable swapchain image, tracked the same way any other image
/// is by the sync engine — only it borrows rather than owns its backing
/// memory, and starts life in `UNDEFINED` layout until the first pass
/// transitions it.
pub struct SwapchainImage {
    pub image: ImageId,
    #[cfg(feature = "vulkan")]
    pub(crate) view: vk::ImageView,
}

pub struct Swapchain {
    pub info: SwapchainInfo,
    pub images: Vec<SwapchainImage>,
    pub depth_image: Option<ImageId>,
    pub msaa_color_image: Option<ImageId>,
    #[cfg(feature = "vulkan")]
    pub(crate) depth_view: Option<vk::ImageView>,
    #[cfg(feature = "vulkan")]
    pub(crate) msaa_view: Option<vk::ImageView>,
    pub default_render_target: RenderTargetId,
    /// Index of the image most recently returned by `acquire_next_image`;
    /// `None` before the first `begin_frame` of this swapchain's life.
    pub current_image_index: Option<u32>,
    #[cfg(feature = "vulkan")]
    pub(crate) handle: vk::SwapchainKHR,
}

impl Swapchain {
    /// `vkAcquireNextImageKHR` integration: acquires the next presentable
    /// image, signaling `image_available` (the current frame slot's
    /// acquire semaphore, owned by the context's `FrameResource`), and
    /// tolerates `SUBOPTIMAL_KHR` per spec.md §7 ("swapchain suboptimal on
    /// acquire -> tolerate").
    #[cfg(feature = "vulkan")]
    pub fn acquire_next_image(
        &mut self,
        loader: &ash::extensions::khr::Swapchain,
        image_available: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<u32> {
        let result =
            unsafe { loader.acquire_next_image(self.handle, timeout_ns, image_available, vk::Fence::null()) };
        match result {
            Ok((index, _suboptimal)) => {
                self.current_image_index = Some(index);
                Ok(index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GfxError::invalid_operation(
                "swapchain out of date; resize_context is required before continuing",
            )),
            Err(e) => Err(GfxError::from(e)),
        }
    }

    pub fn current_image(&self) -> Result<&SwapchainImage> {
        let idx = self
            .current_image_index
            .ok_or_else(|| GfxError::invalid_operation("no swapchain image has been acquired this frame"))?;
        self.images
            .get(idx as usize)
            .ok_or_else(|| GfxError::out_of_bounds("swapchain image index out of range"))
    }
}
