//! Sampler: a slim wrapper with no sync state, grounded on spec.md §3.

#[derive(Debug, Clone, Copy)]
pub struct SamplerInfo {
    #[cfg(feature = "vulkan")]
    pub min_filter: ash::vk::Filter,
    #[cfg(feature = "vulkan")]
    pub mag_filter: ash::vk::Filter,
    #[cfg(feature = "vulkan")]
    pub address_mode_u: ash::vk::SamplerAddressMode,
    #[cfg(feature = "vulkan")]
    pub address_mode_v: ash::vk::SamplerAddressMode,
    #[cfg(feature = "vulkan")]
    pub address_mode_w: ash::vk::SamplerAddressMode,
    pub max_anisotropy: f32,
    pub lod_min: f32,
    pub lod_max: f32,
}

pub struct Sampler {
    pub info: SamplerInfo,
    #[cfg(feature = "vulkan")]
    pub(crate) handle: ash::vk::Sampler,
}
