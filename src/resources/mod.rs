//! Resource objects: buffers, images, views, samplers, shader modules,
//! pipelines, and render targets. Grounded on spec.md §3 (DATA MODEL) and
//! §9's "reframe as arena + index" design note: rather than handing out
//! raw pointers or reference-counted handles, every resource lives in a
//! `slotmap` owned by its `Context` and is addressed by a typed key.

pub(crate) mod buffer;
pub(crate) mod image;
pub(crate) mod pipeline;
pub(crate) mod render_target;
pub(crate) mod sampler;
pub(crate) mod shader;

pub use buffer::{Buffer, BufferInfo, BufferStorageType, BufferUsage};
pub use image::{Image, ImageInfo, ImageType, ImageUsage};
pub use pipeline::{
    ComputePipeline, ComputePipelineInfo, DescriptorSetLayout, GraphicsPipeline,
    GraphicsPipelineInfo, PipelineLayout,
};
pub use render_target::{AttachmentDesc, AttachmentType, RenderTarget, RenderTargetInfo};
pub use sampler::{Sampler, SamplerInfo};
pub use shader::{DescriptorType, ReflectedBinding, ShaderModule, ShaderStage};

slotmap::new_key_type! {
    pub struct BufferId;
    pub struct ImageId;
    pub struct ImageViewId;
    pub struct SamplerId;
    pub struct ShaderModuleId;
    pub struct TexelBufferViewId;
    pub struct RenderTargetId;
    pub struct GraphicsPipelineId;
    pub struct ComputePipelineId;
    pub struct CmdBufferId;
}

/// A slim wrapper with no sync state of its own, borrowing the image (or
/// buffer) it views.
#[derive(Debug, Clone, Copy)]
pub struct ImageView {
    pub image: ImageId,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct TexelBufferView {
    pub buffer: BufferId,
    pub offset: u64,
    pub range: u64,
    #[cfg(feature = "vulkan")]
    pub format: ash::vk::Format,
}
