//! Image resource, grounded on spec.md §3 "Image" — extent/layers/mips/
//! format/sample-count/type plus a sync state that additionally tracks the
//! current image layout.

use bitflags::bitflags;

use crate::sync::SyncState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Image2D,
    Image3D,
    Cube,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ImageUsage: u32 {
        const SAMPLE_FROM          = 1 << 0;
        const STORAGE              = 1 << 1;
        const ATTACHMENT           = 1 << 2;
        const XFER_SRC             = 1 << 3;
        const XFER_DST             = 1 << 4;
        const MIPMAP_GENERATION    = 1 << 5;
        const TRANSIENT_ATTACHMENT = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layer_count: u32,
    pub mip_count: u32,
    #[cfg(feature = "vulkan")]
    pub format: ash::vk::Format,
    pub sample_count: u32,
    pub image_type: ImageType,
    pub usage: ImageUsage,
}

/// An image. May own its backing memory, or borrow it — swapchain image
/// wrappers borrow, since the swapchain itself owns the presentable
/// images' memory.
pub struct Image {
    pub info: ImageInfo,
    pub sync_state: SyncState,
    pub(crate) owns_memory: bool,
    #[cfg(feature = "vulkan")]
    pub(crate) handle: ash::vk::Image,
    #[cfg(feature = "vulkan")]
    pub(crate) allocation: Option<vk_mem::Allocation>,
}

impl Image {
    pub fn identity_key(&self) -> u64 {
        #[cfg(feature = "vulkan")]
        {
            use ash::vk::Handle;
            self.handle.as_raw()
        }
        #[cfg(not(feature = "vulkan"))]
        {
            self as *const Self as u64
        }
    }

    pub fn is_borrowed(&self) -> bool {
        !self.owns_memory
    }
}
