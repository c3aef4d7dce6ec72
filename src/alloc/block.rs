//! Fixed-size block pool with automatic pool growth and periodic
//! over-allocation cleanup.
//!
//! Grounded on `original_source/source/ngf-common/block-alloc.{h,c}`. The C
//! version threads an intrusive freelist through the blocks themselves and
//! returns raw pointers; here blocks are addressed by an opaque `BlockId`
//! (pool index, slot index) so the allocator owns its storage and there is
//! nothing to dangle.

const OVERALLOC_THRESHOLD: f32 = 1.3;
const HIST_BUFFER_SIZE: usize = 3;

/// Identifies a single block. Only meaningful for the `BlockAllocator` that
/// produced it; using it with a different allocator is a bug, and debug
/// builds catch it via `tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId {
    pool: u32,
    slot: u32,
    #[cfg(debug_assertions)]
    tag: u32,
}

struct Pool {
    data: Vec<u8>,
    active_blocks: u32,
}

/// A pool of fixed-size, individually freeable blocks.
pub struct BlockAllocator {
    block_size: usize,
    blocks_per_pool: u32,
    pools: Vec<Option<Pool>>,
    freelist: Vec<BlockId>,
    #[cfg(debug_assertions)]
    in_use: Vec<Vec<bool>>,
    #[cfg(debug_assertions)]
    tag: u32,
    nblocks_total: u32,
    nblocks_free: u32,
    max_concurrent_allocs: u32,
    overalloc_hist: [f32; HIST_BUFFER_SIZE],
    overalloc_hist_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlockAllocError {
    #[error("block was already free")]
    DoubleFree,
    #[error("block belongs to a different allocator")]
    WrongAllocator,
}

impl BlockAllocator {
    pub fn new(block_size: usize, blocks_per_pool: u32) -> Self {
        #[cfg(debug_assertions)]
        static NEXT_TAG: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(1);

        let mut allocator = Self {
            block_size,
            blocks_per_pool,
            pools: Vec::new(),
            freelist: Vec::new(),
            #[cfg(debug_assertions)]
            in_use: Vec::new(),
            #[cfg(debug_assertions)]
            tag: NEXT_TAG.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            nblocks_total: 0,
            nblocks_free: 0,
            max_concurrent_allocs: 0,
            overalloc_hist: [0.0; HIST_BUFFER_SIZE],
            overalloc_hist_idx: 0,
        };
        allocator.add_pool();
        allocator
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn add_pool(&mut self) {
        let pool_idx = self.pools.iter().position(|p| p.is_none());
        let pool = Pool {
            data: vec![0u8; self.block_size * self.blocks_per_pool as usize],
            active_blocks: 0,
        };
        let pool_idx = match pool_idx {
            Some(idx) => {
                self.pools[idx] = Some(pool);
                idx as u32
            }
            None => {
                self.pools.push(Some(pool));
                self.pools.len() as u32 - 1
            }
        };
        #[cfg(debug_assertions)]
        {
            if (pool_idx as usize) < self.in_use.len() {
                self.in_use[pool_idx as usize] = vec![false; self.blocks_per_pool as usize];
            } else {
                self.in_use.push(vec![false; self.blocks_per_pool as usize]);
            }
        }
        for slot in 0..self.blocks_per_pool {
            self.freelist.push(BlockId {
                pool: pool_idx,
                slot,
                #[cfg(debug_assertions)]
                tag: self.tag,
            });
        }
        self.nblocks_total += self.blocks_per_pool;
        self.nblocks_free += self.blocks_per_pool;
    }

    /// Acquires a free block, growing the pool set if none is available.
    pub fn alloc(&mut self) -> BlockId {
        if self.freelist.is_empty() {
            self.add_pool();
        }
        let id = self.freelist.pop().expect("just ensured a free block exists");
        self.pools[id.pool as usize]
            .as_mut()
            .expect("pool exists for a freelist entry")
            .active_blocks += 1;
        self.nblocks_free -= 1;
        let concurrent = self.nblocks_total - self.nblocks_free;
        self.max_concurrent_allocs = self.max_concurrent_allocs.max(concurrent);
        #[cfg(debug_assertions)]
        {
            self.in_use[id.pool as usize][id.slot as usize] = true;
        }
        id
    }

    pub fn free(&mut self, id: BlockId) -> Result<(), BlockAllocError> {
        #[cfg(debug_assertions)]
        {
            if id.tag != self.tag {
                return Err(BlockAllocError::WrongAllocator);
            }
            let in_use = &mut self.in_use[id.pool as usize][id.slot as usize];
            if !*in_use {
                return Err(BlockAllocError::DoubleFree);
            }
            *in_use = false;
        }
        let pool = self.pools[id.pool as usize]
            .as_mut()
            .expect("pool exists for a previously-allocated block");
        pool.active_blocks -= 1;
        self.nblocks_free += 1;
        self.freelist.push(id);
        Ok(())
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut [u8] {
        let size = self.block_size;
        let pool = self.pools[id.pool as usize]
            .as_mut()
            .expect("pool exists for a live block id");
        let start = id.slot as usize * size;
        &mut pool.data[start..start + size]
    }

    pub fn block(&self, id: BlockId) -> &[u8] {
        let size = self.block_size;
        let pool = self.pools[id.pool as usize]
            .as_ref()
            .expect("pool exists for a live block id");
        let start = id.slot as usize * size;
        &pool.data[start..start + size]
    }

    /// Returns wholly-unused pools to the system once the moving average of
    /// the over-allocation ratio crosses the threshold, matching
    /// `ngfi_blkalloc_cleanup`.
    pub fn cleanup(&mut self) -> usize {
        let max_concurrent = self.max_concurrent_allocs.max(1);
        let nrequired_pools = max_concurrent.div_ceil(self.blocks_per_pool);
        let nactive_pools = self.pools.iter().filter(|p| p.is_some()).count() as u32;
        let over_alloc_factor = nactive_pools as f32 / nrequired_pools.max(1) as f32;

        if over_alloc_factor > 1.0 {
            self.overalloc_hist[self.overalloc_hist_idx] = over_alloc_factor;
            self.overalloc_hist_idx = (self.overalloc_hist_idx + 1) % HIST_BUFFER_SIZE;
        }

        let avg_over_alloc: f32 =
            self.overalloc_hist.iter().sum::<f32>() / HIST_BUFFER_SIZE as f32;
        let needs_cleanup = avg_over_alloc > OVERALLOC_THRESHOLD;

        let mut released = 0usize;
        if needs_cleanup {
            let mut nactive_pools = nactive_pools;
            for pool_idx in 0..self.pools.len() {
                if nactive_pools <= nrequired_pools {
                    break;
                }
                let empty = matches!(&self.pools[pool_idx], Some(p) if p.active_blocks == 0);
                if empty {
                    self.pools[pool_idx] = None;
                    self.freelist.retain(|id| id.pool as usize != pool_idx);
                    self.nblocks_total -= self.blocks_per_pool;
                    self.nblocks_free -= self.blocks_per_pool;
                    nactive_pools -= 1;
                    released += self.blocks_per_pool as usize * self.block_size;
                    if released > 0 {
                        tracing::info!(bytes = released, "block allocator released pool");
                    }
                }
            }
        }
        self.max_concurrent_allocs = 0;
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_recycles() {
        let mut a = BlockAllocator::new(64, 4);
        let ids: Vec<_> = (0..6).map(|_| a.alloc()).collect();
        assert_eq!(a.nblocks_total, 8); // grew to a second pool
        for id in &ids {
            a.free(*id).unwrap();
        }
        assert_eq!(a.nblocks_free, 8);
    }

    #[test]
    fn double_free_detected_in_debug() {
        let mut a = BlockAllocator::new(32, 2);
        let id = a.alloc();
        a.free(id).unwrap();
        #[cfg(debug_assertions)]
        assert_eq!(a.free(id), Err(BlockAllocError::DoubleFree));
    }

    #[test]
    fn wrong_allocator_detected_in_debug() {
        let mut a = BlockAllocator::new(32, 2);
        let mut b = BlockAllocator::new(32, 2);
        let id = a.alloc();
        #[cfg(debug_assertions)]
        assert_eq!(b.free(id), Err(BlockAllocError::WrongAllocator));
        a.free(id).unwrap();
    }

    #[test]
    fn cleanup_releases_empty_pools_once_over_threshold() {
        let mut a = BlockAllocator::new(16, 4);
        // grow to 4 pools' worth of concurrent allocations, then free all
        let ids: Vec<_> = (0..16).map(|_| a.alloc()).collect();
        for id in ids {
            a.free(id).unwrap();
        }
        // simulate repeated cleanup passes under a sustained low watermark
        a.max_concurrent_allocs = 1;
        let mut released_total = 0;
        for _ in 0..HIST_BUFFER_SIZE {
            released_total += a.cleanup();
        }
        assert!(released_total > 0, "expected empty pools to be released eventually");
    }
}
