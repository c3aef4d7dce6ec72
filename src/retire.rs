//! Per-frame retire queues of deferred-destruction objects, grounded on
//! spec.md §4.C6.
//!
//! An object whose destruction must wait for in-flight GPU work to finish
//! is appended to the retire queue of the frame slot it was retired under,
//! keyed by an object-kind enum, as a chunked append-only list. The whole
//! kind's destructor runs in bulk the next time that ring slot comes back
//! around, after its fences have signaled — never per-object.

use crate::alloc::{BlockAllocator, ChunkList};
use crate::pools::{CommandPoolHandle, DescriptorPoolHandle};

#[cfg(feature = "vulkan")]
use ash::vk;

#[cfg(feature = "vulkan")]
type Allocation = vk_mem::Allocation;
#[cfg(not(feature = "vulkan"))]
type Allocation = ();

#[cfg(feature = "vulkan")]
type BufferH = vk::Buffer;
#[cfg(not(feature = "vulkan"))]
type BufferH = u64;
#[cfg(feature = "vulkan")]
type ImageH = vk::Image;
#[cfg(not(feature = "vulkan"))]
type ImageH = u64;
#[cfg(feature = "vulkan")]
type ImageViewH = vk::ImageView;
#[cfg(not(feature = "vulkan"))]
type ImageViewH = u64;
#[cfg(feature = "vulkan")]
type SamplerH = vk::Sampler;
#[cfg(not(feature = "vulkan"))]
type SamplerH = u64;
#[cfg(feature = "vulkan")]
type ShaderModuleH = vk::ShaderModule;
#[cfg(not(feature = "vulkan"))]
type ShaderModuleH = u64;
#[cfg(feature = "vulkan")]
type DescriptorSetLayoutH = vk::DescriptorSetLayout;
#[cfg(not(feature = "vulkan"))]
type DescriptorSetLayoutH = u64;
#[cfg(feature = "vulkan")]
type PipelineLayoutH = vk::PipelineLayout;
#[cfg(not(feature = "vulkan"))]
type PipelineLayoutH = u64;
#[cfg(feature = "vulkan")]
type PipelineH = vk::Pipeline;
#[cfg(not(feature = "vulkan"))]
type PipelineH = u64;
#[cfg(feature = "vulkan")]
type RenderPassH = vk::RenderPass;
#[cfg(not(feature = "vulkan"))]
type RenderPassH = u64;
#[cfg(feature = "vulkan")]
type FramebufferH = vk::Framebuffer;
#[cfg(not(feature = "vulkan"))]
type FramebufferH = u64;

/// One deferred-destruction entry. Carries whatever the matching backend
/// destructor needs — a bare handle for slim objects, handle plus
/// allocation for memory-owning ones.
pub enum RetiredObject {
    Buffer { handle: BufferH, allocation: Allocation },
    Image { handle: ImageH, allocation: Option<Allocation> },
    ImageView(ImageViewH),
    Sampler(SamplerH),
    ShaderModule(ShaderModuleH),
    DescriptorSetLayout(DescriptorSetLayoutH),
    PipelineLayout(PipelineLayoutH),
    Pipeline(PipelineH),
    RenderPass(RenderPassH),
    Framebuffer(FramebufferH),
    DescriptorPool(DescriptorPoolHandle),
    CommandPool(CommandPoolHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum RetireKind {
    Buffer,
    Image,
    ImageView,
    Sampler,
    ShaderModule,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    RenderPass,
    Framebuffer,
    DescriptorPool,
    CommandPool,
}

pub const NUM_RETIRE_KINDS: usize = 12;

impl RetireKind {
    fn index(self) -> usize {
        match self {
            RetireKind::Buffer => 0,
            RetireKind::Image => 1,
            RetireKind::ImageView => 2,
            RetireKind::Sampler => 3,
            RetireKind::ShaderModule => 4,
            RetireKind::DescriptorSetLayout => 5,
            RetireKind::PipelineLayout => 6,
            RetireKind::Pipeline => 7,
            RetireKind::RenderPass => 8,
            RetireKind::Framebuffer => 9,
            RetireKind::DescriptorPool => 10,
            RetireKind::CommandPool => 11,
        }
    }

    fn of(object: &RetiredObject) -> Self {
        match object {
            RetiredObject::Buffer { .. } => RetireKind::Buffer,
            RetiredObject::Image { .. } => RetireKind::Image,
            RetiredObject::ImageView(_) => RetireKind::ImageView,
            RetiredObject::Sampler(_) => RetireKind::Sampler,
            RetiredObject::ShaderModule(_) => RetireKind::ShaderModule,
            RetiredObject::DescriptorSetLayout(_) => RetireKind::DescriptorSetLayout,
            RetiredObject::PipelineLayout(_) => RetireKind::PipelineLayout,
            RetiredObject::Pipeline(_) => RetireKind::Pipeline,
            RetiredObject::RenderPass(_) => RetireKind::RenderPass,
            RetiredObject::Framebuffer(_) => RetireKind::Framebuffer,
            RetiredObject::DescriptorPool(_) => RetireKind::DescriptorPool,
            RetiredObject::CommandPool(_) => RetireKind::CommandPool,
        }
    }
}

/// One frame slot's retire queue: a chunk list per object kind, backed by
/// a block allocator shared across kinds (the spec leaves per-list-node
/// granularity an open question — §9 — and a single shared allocator for
/// the whole queue is the simplest choice that still gets bulk chunk
/// reclamation; see DESIGN.md).
pub struct RetireQueue {
    lists: Vec<ChunkList<RetiredObject>>,
    blkalloc: BlockAllocator,
}

impl RetireQueue {
    pub fn new() -> Self {
        let block_size = std::mem::size_of::<RetiredObject>() * 32;
        Self {
            lists: (0..NUM_RETIRE_KINDS).map(|_| ChunkList::new()).collect(),
            blkalloc: BlockAllocator::new(block_size, 8),
        }
    }

    pub fn push(&mut self, object: RetiredObject) {
        let idx = RetireKind::of(&object).index();
        self.lists[idx].append(&mut self.blkalloc, object);
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(ChunkList::is_empty)
    }

    pub fn len(&self) -> usize {
        self.lists.iter().map(ChunkList::len).sum()
    }

    /// Invokes `destroy` once per retired object across every kind, then
    /// empties the queue. Called when this ring slot is revisited, after
    /// the slot's fences have signaled.
    pub fn flush(&mut self, mut destroy: impl FnMut(&RetiredObject)) {
        for list in &mut self.lists {
            for object in list.iter() {
                destroy(object);
            }
            list.clear(&mut self.blkalloc);
        }
    }
}

impl Default for RetireQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_are_destroyed_in_bulk_per_kind_and_queue_empties() {
        let mut queue = RetireQueue::new();
        for i in 0..5u64 {
            queue.push(RetiredObject::ImageView(i));
        }
        for i in 0..3u64 {
            queue.push(RetiredObject::Sampler(i));
        }
        assert_eq!(queue.len(), 8);

        let mut destroyed_views = 0;
        let mut destroyed_samplers = 0;
        queue.flush(|object| match object {
            RetiredObject::ImageView(_) => destroyed_views += 1,
            RetiredObject::Sampler(_) => destroyed_samplers += 1,
            _ => {}
        });
        assert_eq!(destroyed_views, 5);
        assert_eq!(destroyed_samplers, 3);
        assert!(queue.is_empty());
    }
}
