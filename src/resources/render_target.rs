//! Render target: a list of attachment descriptions plus the cached
//! compat render pass and framebuffer, grounded on spec.md §3
//! "Render target" and §4.C8.

use smallvec::SmallVec;

use super::image::ImageId;
use crate::render_pass_cache::MAX_ATTACHMENTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentType {
    Color,
    Depth,
    DepthStencil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDesc {
    #[cfg(feature = "vulkan")]
    pub format: ash::vk::Format,
    pub sample_count: u32,
    pub attachment_type: AttachmentType,
    pub is_resolve: bool,
}

/// The list of attachment descriptions, used as the cache key for
/// render-pass/pipeline compatibility (spec.md §4.C8 "compat key").
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderPassCompatKey(pub SmallVec<[CompatKeyEntry; MAX_ATTACHMENTS]>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompatKeyEntry {
    #[cfg(feature = "vulkan")]
    pub format: i32, // ash::vk::Format as i32, Hash-friendly
    pub sample_count: u32,
    pub attachment_type: AttachmentTypeKey,
    pub is_resolve: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentTypeKey {
    Color,
    Depth,
    DepthStencil,
}

impl From<AttachmentType> for AttachmentTypeKey {
    fn from(t: AttachmentType) -> Self {
        match t {
            AttachmentType::Color => AttachmentTypeKey::Color,
            AttachmentType::Depth => AttachmentTypeKey::Depth,
            AttachmentType::DepthStencil => AttachmentTypeKey::DepthStencil,
        }
    }
}

impl RenderPassCompatKey {
    pub fn from_attachments(attachments: &[AttachmentDesc]) -> Self {
        Self(
            attachments
                .iter()
                .map(|a| CompatKeyEntry {
                    #[cfg(feature = "vulkan")]
                    format: a.format.as_raw(),
                    sample_count: a.sample_count,
                    attachment_type: a.attachment_type.into(),
                    is_resolve: a.is_resolve,
                })
                .collect(),
        )
    }
}

pub struct RenderTargetInfo {
    pub attachments: SmallVec<[AttachmentDesc; MAX_ATTACHMENTS]>,
    pub images: Vec<ImageId>,
    pub width: u32,
    pub height: u32,
}

pub struct RenderTarget {
    pub info: RenderTargetInfo,
    pub compat_key: RenderPassCompatKey,
    pub is_default: bool,
    #[cfg(feature = "vulkan")]
    pub(crate) framebuffers: Vec<ash::vk::Framebuffer>,
}
