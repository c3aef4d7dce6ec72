//! Render-pass / framebuffer cache, grounded on spec.md §4.C8.
//!
//! Canonicalizes render passes by two keys: a **compat key** (the
//! attachment description list — format, sample count, type, resolve
//! flag — used for pipeline/target compatibility) and an **ops key** (a
//! packed 4-bit-per-attachment load/store op pair, up to 16 attachments,
//! used per `begin_render_pass`). Lookup is linear, matching the original's
//! per-context dynamic array.

use smallvec::SmallVec;

use crate::resources::render_target::RenderPassCompatKey;
use crate::resources::RenderTargetId;

pub const MAX_ATTACHMENTS: usize = 16;
/// Inline capacity for the per-context render-pass cache — bounded in
/// practice by a handful of distinct (render target, ops-key) pairs.
const INLINE_CACHE_ENTRIES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load = 0,
    Clear = 1,
    DontCare = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store = 0,
    DontCare = 1,
}

/// Packs up to 16 `(load_op, store_op)` pairs into a single `u64`, 4 bits
/// per attachment: `(load_op << 2) | store_op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpsKey(u64);

impl OpsKey {
    pub fn build(ops: &[(LoadOp, StoreOp)]) -> Self {
        assert!(ops.len() <= MAX_ATTACHMENTS, "at most 16 attachments are supported");
        let mut packed = 0u64;
        for (i, (load, store)) in ops.iter().enumerate() {
            let nibble = ((*load as u64) << 2) | (*store as u64);
            packed |= nibble << (i * 4);
        }
        Self(packed)
    }

    pub fn decode(self, count: usize) -> SmallVec<[(LoadOp, StoreOp); MAX_ATTACHMENTS]> {
        (0..count)
            .map(|i| {
                let nibble = (self.0 >> (i * 4)) & 0xF;
                let load = match nibble >> 2 {
                    0 => LoadOp::Load,
                    1 => LoadOp::Clear,
                    _ => LoadOp::DontCare,
                };
                let store = match nibble & 0b1 {
                    0 => StoreOp::Store,
                    _ => StoreOp::DontCare,
                };
                (load, store)
            })
            .collect()
    }
}

/// Opaque handle to a cached backend render-pass object.
#[cfg(feature = "vulkan")]
pub type RenderPassHandle = ash::vk::RenderPass;
#[cfg(not(feature = "vulkan"))]
pub type RenderPassHandle = u64;

struct CacheEntry {
    render_target: RenderTargetId,
    ops_key: OpsKey,
    pass: RenderPassHandle,
}

#[derive(Default)]
pub struct RenderPassCache {
    entries: SmallVec<[CacheEntry; INLINE_CACHE_ENTRIES]>,
    /// Retired pass handles, queued to the retire queue rather than
    /// destroyed immediately (the cache itself has no fence to wait on).
    pub pending_retire: Vec<RenderPassHandle>,
}

impl RenderPassCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, render_target: RenderTargetId, ops_key: OpsKey) -> Option<RenderPassHandle> {
        self.entries
            .iter()
            .find(|e| e.render_target == render_target && e.ops_key == ops_key)
            .map(|e| e.pass)
    }

    /// Looks up a cached pass, or builds one with `create` and inserts it.
    pub fn get_or_create(
        &mut self,
        render_target: RenderTargetId,
        ops_key: OpsKey,
        create: impl FnOnce() -> RenderPassHandle,
    ) -> RenderPassHandle {
        if let Some(existing) = self.lookup(render_target, ops_key) {
            return existing;
        }
        let pass = create();
        self.entries.push(CacheEntry {
            render_target,
            ops_key,
            pass,
        });
        pass
    }

    /// Flushes every cache entry belonging to `render_target`, queueing
    /// its passes for retire. Called when the render target is destroyed.
    pub fn flush_render_target(&mut self, render_target: RenderTargetId) {
        let (keep, drop): (SmallVec<[CacheEntry; INLINE_CACHE_ENTRIES]>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|e| e.render_target != render_target);
        self.entries = keep;
        self.pending_retire.extend(drop.into_iter().map(|e| e.pass));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::RenderTargetId;

    fn rt_id() -> RenderTargetId {
        let mut sm: slotmap::SlotMap<RenderTargetId, ()> = slotmap::SlotMap::with_key();
        sm.insert(())
    }

    fn handle_from(n: u64) -> RenderPassHandle {
        #[cfg(feature = "vulkan")]
        {
            use ash::vk::Handle;
            ash::vk::RenderPass::from_raw(n)
        }
        #[cfg(not(feature = "vulkan"))]
        {
            n
        }
    }

    #[test]
    fn ops_key_roundtrips() {
        let ops = vec![(LoadOp::Clear, StoreOp::Store), (LoadOp::DontCare, StoreOp::DontCare)];
        let key = OpsKey::build(&ops);
        assert_eq!(&key.decode(2)[..], &ops[..]);
    }

    #[test]
    fn repeated_begin_with_identical_ops_reuses_cache_entry() {
        let mut cache = RenderPassCache::new();
        let rt = rt_id();
        let ops_key = OpsKey::build(&[(LoadOp::Clear, StoreOp::Store)]);
        let mut created = 0;
        for _ in 0..5 {
            cache.get_or_create(rt, ops_key, || {
                created += 1;
                created as u64
            });
        }
        assert_eq!(created, 1, "only the first begin should create a new pass");
    }
}
