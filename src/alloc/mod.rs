//! Transient allocation primitives: a per-frame bump allocator, a fixed-size
//! block pool, and a growable chunk list built on top of it.
//!
//! Grounded on `original_source/source/ngf-common/{stack-alloc,block-alloc,
//! chunk-list}.*`. The bump allocator is realized with `bumpalo`, which
//! already implements the "chain a new block and continue" growth strategy
//! the C original hand-rolls; the block allocator and chunk list have no
//! off-the-shelf equivalent in the teacher's dependency stack and are
//! ported directly.

pub mod block;
pub mod chunk_list;
pub mod stack;

pub use block::BlockAllocator;
pub use chunk_list::ChunkList;
pub use stack::{frame_store, reset_frame_store, reset_tmp_store, tmp_store, StackAllocator};
