//! Per-frame-slot descriptor superpool, grounded on spec.md §4.C5/§4.C2
//! "Descriptor superpool": a singly-linked chain of descriptor pools.
//! Allocation picks the current pool if it has room for a set's required
//! per-type descriptor counts, else advances to or creates a new pool.

use crate::error::{GfxError, Result};
use crate::resources::shader::DescriptorType;

/// How many descriptors of each type a single pool in the chain provides.
/// Sized generously enough that most programs never need a second pool;
/// real pressure (many distinct sets per frame) grows the chain instead of
/// resizing any one pool.
const DESCRIPTORS_PER_TYPE_PER_POOL: u32 = 256;
const MAX_SETS_PER_POOL: u32 = 256;

#[cfg(feature = "vulkan")]
pub type DescriptorPoolHandle = ash::vk::DescriptorPool;
#[cfg(not(feature = "vulkan"))]
pub type DescriptorPoolHandle = u64;

#[cfg(feature = "vulkan")]
pub type DescriptorSetHandle = ash::vk::DescriptorSet;
#[cfg(not(feature = "vulkan"))]
pub type DescriptorSetHandle = u64;

/// Counts how many descriptors of each type a set layout requires, used
/// both to size a pool and to check whether the current pool still has
/// room for one more allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorCounts {
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub sampled_images: u32,
    pub samplers: u32,
    pub combined_image_samplers: u32,
    pub storage_images: u32,
    pub texel_buffers: u32,
}

impl DescriptorCounts {
    pub fn from_bindings(bindings: &[crate::resources::pipeline::LayoutBinding]) -> Self {
        let mut counts = Self::default();
        for b in bindings {
            match b.descriptor_type {
                DescriptorType::UniformBuffer => counts.uniform_buffers += b.count,
                DescriptorType::StorageBuffer => counts.storage_buffers += b.count,
                DescriptorType::Image => counts.sampled_images += b.count,
                DescriptorType::Sampler => counts.samplers += b.count,
                DescriptorType::ImageAndSampler => counts.combined_image_samplers += b.count,
                DescriptorType::StorageImage => counts.storage_images += b.count,
                DescriptorType::TexelBuffer => counts.texel_buffers += b.count,
            }
        }
        counts
    }

    fn add(&mut self, other: &Self) {
        self.uniform_buffers += other.uniform_buffers;
        self.storage_buffers += other.storage_buffers;
        self.sampled_images += other.sampled_images;
        self.samplers += other.samplers;
        self.combined_image_samplers += other.combined_image_samplers;
        self.storage_images += other.storage_images;
        self.texel_buffers += other.texel_buffers;
    }

    fn fits_within(&self, cap: u32) -> bool {
        self.uniform_buffers <= cap
            && self.storage_buffers <= cap
            && self.sampled_images <= cap
            && self.samplers <= cap
            && self.combined_image_samplers <= cap
            && self.storage_images <= cap
            && self.texel_buffers <= cap
    }
}

struct PoolNode {
    handle: DescriptorPoolHandle,
    utilization: DescriptorCounts,
    sets_allocated: u32,
}

/// A singly-linked chain of descriptor pools for one frame slot. New nodes
/// are appended lazily; `reset` zeroes every node's utilization counters
/// for recycling rather than destroying and recreating pools.
#[derive(Default)]
pub struct DescriptorSuperpool {
    chain: Vec<PoolNode>,
    current: usize,
}

impl DescriptorSuperpool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a descriptor set for `counts`, advancing to (or creating)
    /// the next pool in the chain if the current one lacks capacity.
    pub fn allocate(
        &mut self,
        counts: DescriptorCounts,
        create_pool: impl FnOnce() -> Result<DescriptorPoolHandle>,
        allocate_set: impl FnOnce(DescriptorPoolHandle) -> Result<DescriptorSetHandle>,
    ) -> Result<DescriptorSetHandle> {
        loop {
            if self.current >= self.chain.len() {
                let handle = create_pool()?;
                self.chain.push(PoolNode {
                    handle,
                    utilization: DescriptorCounts::default(),
                    sets_allocated: 0,
                });
            }
            let node = &mut self.chain[self.current];
            let mut prospective = node.utilization;
            prospective.add(&counts);
            let has_room = node.sets_allocated < MAX_SETS_PER_POOL
                && prospective.fits_within(DESCRIPTORS_PER_TYPE_PER_POOL);

            if has_room {
                let set = allocate_set(node.handle)?;
                node.utilization = prospective;
                node.sets_allocated += 1;
                return Ok(set);
            }

            self.current += 1;
            if self.current > self.chain.len() {
                return Err(GfxError::out_of_bounds("descriptor superpool chain corrupted"));
            }
        }
    }

    /// Walks the whole chain, zeroing utilization counters so every pool
    /// can be reused from scratch — called when this frame slot is
    /// recycled after its fences signal.
    pub fn reset(&mut self, mut reset_pool: impl FnMut(DescriptorPoolHandle)) {
        for node in &mut self.chain {
            reset_pool(node.handle);
            node.utilization = DescriptorCounts::default();
            node.sets_allocated = 0;
        }
        self.current = 0;
    }

    pub fn pool_handles(&self) -> impl Iterator<Item = DescriptorPoolHandle> + '_ {
        self.chain.iter().map(|n| n.handle)
    }

    pub fn pool_count(&self) -> usize {
        self.chain.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_the_current_pool_while_it_has_room() {
        let mut pool = DescriptorSuperpool::new();
        let mut created = 0u64;
        for _ in 0..4 {
            pool.allocate(
                DescriptorCounts { uniform_buffers: 1, ..Default::default() },
                || {
                    created += 1;
                    Ok(created)
                },
                |handle| Ok(handle * 1000),
            )
            .unwrap();
        }
        assert_eq!(created, 1, "four small allocations should stay in the first pool");
        assert_eq!(pool.pool_count(), 1);
    }

    #[test]
    fn advances_to_a_new_pool_once_capacity_is_exhausted() {
        let mut pool = DescriptorSuperpool::new();
        let mut created = 0u64;
        for _ in 0..(DESCRIPTORS_PER_TYPE_PER_POOL + 1) {
            pool.allocate(
                DescriptorCounts { uniform_buffers: 1, ..Default::default() },
                || {
                    created += 1;
                    Ok(created)
                },
                |handle| Ok(handle * 1000),
            )
            .unwrap();
        }
        assert_eq!(created, 2, "exceeding one pool's uniform-buffer capacity should grow the chain");
        assert_eq!(pool.pool_count(), 2);
    }

    #[test]
    fn reset_restores_full_capacity_without_recreating_pools() {
        let mut pool = DescriptorSuperpool::new();
        let mut created = 0u64;
        pool.allocate(
            DescriptorCounts { uniform_buffers: DESCRIPTORS_PER_TYPE_PER_POOL, ..Default::default() },
            || {
                created += 1;
                Ok(created)
            },
            |handle| Ok(handle),
        )
        .unwrap();
        pool.reset(|_| {});
        pool.allocate(
            DescriptorCounts { uniform_buffers: 1, ..Default::default() },
            || {
                created += 1;
                Ok(created)
            },
            |handle| Ok(handle),
        )
        .unwrap();
        assert_eq!(created, 1, "reset should let the same pool be reused, not create another");
    }
}
