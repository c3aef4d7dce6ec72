//! Per-frame-slot command superpool, grounded on spec.md §4.C5/§4.C2
//! "Command superpool": a single command pool per frame slot; command
//! buffers are allocated transiently and returned via a whole-pool reset
//! on retire, rather than freed individually.

use crate::error::Result;

#[cfg(feature = "vulkan")]
pub type CommandPoolHandle = ash::vk::CommandPool;
#[cfg(not(feature = "vulkan"))]
pub type CommandPoolHandle = u64;

#[cfg(feature = "vulkan")]
pub type CommandBufferHandle = ash::vk::CommandBuffer;
#[cfg(not(feature = "vulkan"))]
pub type CommandBufferHandle = u64;

/// A single command pool for one frame slot, plus the backend command
/// buffers transiently allocated from it this frame.
pub struct CommandSuperpool {
    pool: Option<CommandPoolHandle>,
    allocated_this_frame: Vec<CommandBufferHandle>,
}

impl Default for CommandSuperpool {
    fn default() -> Self {
        Self { pool: None, allocated_this_frame: Vec::new() }
    }
}

impl CommandSuperpool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new command buffer from this slot's pool, lazily
    /// creating the pool on first use.
    pub fn allocate(
        &mut self,
        create_pool: impl FnOnce() -> Result<CommandPoolHandle>,
        allocate_buffer: impl FnOnce(CommandPoolHandle) -> Result<CommandBufferHandle>,
    ) -> Result<CommandBufferHandle> {
        let pool = match self.pool {
            Some(p) => p,
            None => {
                let p = create_pool()?;
                self.pool = Some(p);
                p
            }
        };
        let buf = allocate_buffer(pool)?;
        self.allocated_this_frame.push(buf);
        Ok(buf)
    }

    /// Resets the whole pool, implicitly freeing every command buffer
    /// allocated from it this cycle. Called once this frame slot's fences
    /// have signaled and it's about to be reused.
    pub fn reset(&mut self, reset_pool: impl FnOnce(CommandPoolHandle)) {
        if let Some(pool) = self.pool {
            reset_pool(pool);
        }
        self.allocated_this_frame.clear();
    }

    pub fn pool_handle(&self) -> Option<CommandPoolHandle> {
        self.pool
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated_this_frame.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazily_creates_the_pool_on_first_allocation() {
        let mut sp = CommandSuperpool::new();
        assert!(sp.pool_handle().is_none());
        let mut pools_created = 0u64;
        sp.allocate(
            || {
                pools_created += 1;
                Ok(pools_created)
            },
            |pool| Ok(pool * 10),
        )
        .unwrap();
        assert_eq!(pools_created, 1);
        assert!(sp.pool_handle().is_some());
        assert_eq!(sp.allocated_count(), 1);
    }

    #[test]
    fn reset_clears_the_per_frame_allocation_list() {
        let mut sp = CommandSuperpool::new();
        sp.allocate(|| Ok(1u64), |pool| Ok(pool)).unwrap();
        sp.allocate(|| Ok(1u64), |pool| Ok(pool)).unwrap();
        assert_eq!(sp.allocated_count(), 2);
        let mut reset_calls = 0;
        sp.reset(|_| reset_calls += 1);
        assert_eq!(reset_calls, 1, "one pool reset, regardless of how many buffers were allocated from it");
        assert_eq!(sp.allocated_count(), 0);
    }
}
