//! Graphics/compute pipelines and the descriptor-set/pipeline layouts the
//! reflection builder (`crate::reflection`) constructs for them.
//!
//! Grounded on spec.md §3 ("Graphics/Compute pipeline") and §4.C7.

use crate::resources::shader::ShaderStage;

/// One binding slot inside a descriptor-set layout, carrying the
/// information the sync engine needs later: which stages access it and
/// whether it's declared read-only.
#[derive(Debug, Clone, Copy)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: super::shader::DescriptorType,
    pub count: u32,
    pub stage_mask: ShaderStage,
    pub readonly: bool,
}

/// A descriptor-set layout; unused sets are materialized empty per
/// spec.md's invariant that a pipeline's set-layout list is contiguous.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayout {
    pub bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayout {
    pub fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineLayout {
    pub set_layouts: Vec<DescriptorSetLayout>,
    #[cfg(feature = "vulkan")]
    pub(crate) handle: Option<ash::vk::PipelineLayout>,
}

#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineInfo {
    pub cull_mode: CullMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub primitive_topology: PrimitiveTopology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

pub struct GraphicsPipeline {
    pub layout: PipelineLayout,
    pub info: GraphicsPipelineInfo,
    pub compatible_render_pass: super::render_target::RenderPassCompatKey,
    #[cfg(feature = "vulkan")]
    pub(crate) handle: ash::vk::Pipeline,
}

pub struct ComputePipelineInfo {
    pub workgroup_size: (u32, u32, u32),
}

pub struct ComputePipeline {
    pub layout: PipelineLayout,
    pub info: ComputePipelineInfo,
    #[cfg(feature = "vulkan")]
    pub(crate) handle: ash::vk::Pipeline,
}
