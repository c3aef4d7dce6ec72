//! Buffer resource, grounded on spec.md §3 "Buffer" and
//! `original_source/source/ngf-vk/impl.c`'s `ngf_buffer` (mapped-pointer +
//! sync-state carrying object).

use bitflags::bitflags;

use crate::sync::SyncState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStorageType {
    HostWriteable,
    HostReadable,
    HostReadWriteable,
    DeviceLocal,
    DeviceLocalHostWriteable,
    DeviceLocalHostReadWriteable,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        const VERTEX      = 1 << 0;
        const INDEX       = 1 << 1;
        const UNIFORM     = 1 << 2;
        const STORAGE     = 1 << 3;
        const TEXEL       = 1 << 4;
        const XFER_SRC    = 1 << 5;
        const XFER_DST    = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferInfo {
    pub size: u64,
    pub storage_type: BufferStorageType,
    pub usage: BufferUsage,
}

/// A buffer: fixed-size GPU-visible memory with a declared storage class.
/// Destruction is always deferred through the retire queue (§4.C6), never
/// immediate, so the handle itself carries no `Drop` behavior beyond
/// bookkeeping performed by its owning `Context`.
pub struct Buffer {
    pub info: BufferInfo,
    pub sync_state: SyncState,
    /// Offset of the persistently mapped pointer within the backing
    /// allocation, valid only for host-visible storage types.
    pub mapped_offset: Option<u64>,
    #[cfg(feature = "vulkan")]
    pub(crate) handle: ash::vk::Buffer,
    #[cfg(feature = "vulkan")]
    pub(crate) allocation: vk_mem::Allocation,
}

impl Buffer {
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

    pub fn is_host_visible(&self) -> bool {
        matches!(
            self.info.storage_type,
            BufferStorageType::HostWriteable
                | BufferStorageType::HostReadable
                | BufferStorageType::HostReadWriteable
                | BufferStorageType::DeviceLocalHostWriteable
                | BufferStorageType::DeviceLocalHostReadWriteable
        )
    }
}
