//! Thread-local bump allocators for transient per-call and per-frame scratch
//! data, grounded on `ngfi_sa`/`ngfi_tmp_store`/`ngfi_frame_store`.

use std::cell::RefCell;

use bumpalo::Bump;

const INITIAL_CAPACITY: usize = 1024 * 100;

/// A growable bump allocator. `bumpalo::Bump` already chains new chunks on
/// exhaustion and drops everything but the first on reset, which is exactly
/// `ngfi_sa`'s behavior, so this is a thin named wrapper rather than a
/// reimplementation.
pub struct StackAllocator {
    bump: Bump,
}

impl StackAllocator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bump: Bump::with_capacity(capacity),
        }
    }

    pub fn alloc<T>(&self, value: T) -> &mut T {
        self.bump.alloc(value)
    }

    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> &mut [T] {
        self.bump.alloc_slice_copy(src)
    }

    /// Drops all chunks but the first and rewinds the bump pointer.
    pub fn reset(&mut self) {
        self.bump.reset();
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }
}

thread_local! {
    static TMP_STORE: RefCell<StackAllocator> =
        RefCell::new(StackAllocator::with_capacity(INITIAL_CAPACITY));
    static FRAME_STORE: RefCell<StackAllocator> =
        RefCell::new(StackAllocator::with_capacity(INITIAL_CAPACITY));
}

/// Scratch storage reset by the engine at well-defined points within a
/// single call (e.g. while building a sync-req batch).
pub fn tmp_store<R>(f: impl FnOnce(&StackAllocator) -> R) -> R {
    TMP_STORE.with(|s| f(&s.borrow()))
}

pub fn reset_tmp_store() {
    TMP_STORE.with(|s| s.borrow_mut().reset());
}

/// Scratch storage reset once per `begin_frame`.
pub fn frame_store<R>(f: impl FnOnce(&StackAllocator) -> R) -> R {
    FRAME_STORE.with(|s| f(&s.borrow()))
}

pub fn reset_frame_store() {
    FRAME_STORE.with(|s| s.borrow_mut().reset());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_reclaims_overflow_blocks() {
        let mut sa = StackAllocator::with_capacity(16);
        for i in 0..64u32 {
            let _ = sa.alloc(i);
        }
        assert!(sa.allocated_bytes() >= 16);
        sa.reset();
        // after reset the bump pointer is back to the start of the first chunk
        let v = sa.alloc(42u32);
        assert_eq!(*v, 42);
    }

    #[test]
    fn thread_locals_are_independent_per_thread() {
        reset_tmp_store();
        let v = tmp_store(|sa| *sa.alloc(7u32));
        assert_eq!(v, 7);
    }
}
