//! Thin adapter over the platform GPU memory allocator used for buffer and
//! image backing memory, grounded on spec.md §3/C3 ("delegates to a
//! platform GPU allocator" — a non-goal is reimplementing one).
//!
//! `vk-mem` already is that platform allocator for the Vulkan-class
//! backend; this module only narrows its general-purpose API down to the
//! handful of allocation patterns the resource constructors need and
//! translates its error type into [`GfxError`].

use crate::error::{GfxError, Result};
use crate::resources::BufferStorageType;

#[cfg(feature = "vulkan")]
use ash::vk;

/// Maps a declared buffer storage class to the `vk-mem` usage hint that
/// picks the right memory heap and mapping behavior.
#[cfg(feature = "vulkan")]
pub fn memory_usage_for_storage_type(storage_type: BufferStorageType) -> vk_mem::MemoryUsage {
    match storage_type {
        BufferStorageType::HostWriteable => vk_mem::MemoryUsage::CpuToGpu,
        BufferStorageType::HostReadable => vk_mem::MemoryUsage::GpuToCpu,
        BufferStorageType::HostReadWriteable => vk_mem::MemoryUsage::CpuOnly,
        BufferStorageType::DeviceLocal => vk_mem::MemoryUsage::GpuOnly,
        BufferStorageType::DeviceLocalHostWriteable
        | BufferStorageType::DeviceLocalHostReadWriteable => vk_mem::MemoryUsage::CpuToGpu,
    }
}

#[cfg(feature = "vulkan")]
pub struct GpuAllocator {
    inner: vk_mem::Allocator,
}

#[cfg(feature = "vulkan")]
impl GpuAllocator {
    pub fn new(instance: &ash::Instance, device: &ash::Device, physical_device: vk::PhysicalDevice) -> Result<Self> {
        let create_info = vk_mem::AllocatorCreateInfo {
            physical_device,
            device: device.clone(),
            instance: instance.clone(),
            flags: vk_mem::AllocatorCreateFlags::NONE,
            preferred_large_heap_block_size: 0,
            frame_in_use_count: 0,
            heap_size_limits: None,
        };
        let inner = vk_mem::Allocator::new(&create_info)
            .map_err(|e| GfxError::object_creation_failed(format!("vk-mem allocator init failed: {e}")))?;
        Ok(Self { inner })
    }

    pub fn allocate_buffer(
        &self,
        create_info: &vk::BufferCreateInfo,
        storage_type: BufferStorageType,
    ) -> Result<(vk::Buffer, vk_mem::Allocation, vk_mem::AllocationInfo)> {
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: memory_usage_for_storage_type(storage_type),
            flags: vk_mem::AllocationCreateFlags::MAPPED,
            ..Default::default()
        };
        self.inner
            .create_buffer(create_info, &alloc_info)
            .map(|(buf, alloc, info)| (buf, alloc, info))
            .map_err(|e| GfxError::out_of_memory(format!("buffer allocation failed: {e}")))
    }

    pub fn allocate_image(
        &self,
        create_info: &vk::ImageCreateInfo,
    ) -> Result<(vk::Image, vk_mem::Allocation, vk_mem::AllocationInfo)> {
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::GpuOnly,
            ..Default::default()
        };
        self.inner
            .create_image(create_info, &alloc_info)
            .map(|(img, alloc, info)| (img, alloc, info))
            .map_err(|e| GfxError::out_of_memory(format!("image allocation failed: {e}")))
    }

    pub fn free_buffer(&self, buffer: vk::Buffer, allocation: &vk_mem::Allocation) {
        if let Err(e) = self.inner.destroy_buffer(buffer, allocation) {
            tracing::warn!(error = %e, "failed to destroy retired buffer allocation");
        }
    }

    pub fn free_image(&self, image: vk::Image, allocation: &vk_mem::Allocation) {
        if let Err(e) = self.inner.destroy_image(image, allocation) {
            tracing::warn!(error = %e, "failed to destroy retired image allocation");
        }
    }

    pub fn mapped_ptr(&self, allocation: &vk_mem::Allocation) -> Result<*mut u8> {
        self.inner
            .map_memory(allocation)
            .map_err(|e| GfxError::object_creation_failed(format!("map_memory failed: {e}")))
    }

    pub fn flush(&self, allocation: &vk_mem::Allocation, offset: u64, size: u64) -> Result<()> {
        self.inner
            .flush_allocation(allocation, offset as usize, size as usize)
            .map_err(|e| GfxError::invalid_operation(format!("flush_allocation failed: {e}")))
    }

    pub fn destroy(&mut self) {
        self.inner.destroy();
    }
}

#[cfg(not(feature = "vulkan"))]
pub struct GpuAllocator;

#[cfg(not(feature = "vulkan"))]
impl GpuAllocator {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }
}

