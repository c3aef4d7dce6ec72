//! Shader module: a backend shader handle plus parsed reflection data,
//! grounded on spec.md §3 "Shader module" and §6.2.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStage: u32 {
        const VERTEX   = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE  = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    Image,
    Sampler,
    ImageAndSampler,
    StorageImage,
    TexelBuffer,
}

/// One `(set, binding)` entry as reported by a single shader module's
/// embedded reflection metadata, before merging across stages.
#[derive(Debug, Clone, Copy)]
pub struct ReflectedBinding {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub readonly: bool,
}

pub struct ShaderModule {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub bindings: Vec<ReflectedBinding>,
    /// Required for compute modules; `None` for vertex/fragment.
    pub workgroup_size: Option<(u32, u32, u32)>,
    pub native_binding_map: Option<crate::native_binding_map::NativeBindingMap>,
    #[cfg(feature = "vulkan")]
    pub(crate) handle: ash::vk::ShaderModule,
}
