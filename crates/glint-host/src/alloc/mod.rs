//! Script heap split across a near and an extended memory pool
mod pool;
mod stats;

use std::ptr::NonNull;

use glint_config::AllocatorConfig;
use tracing::{debug, info, trace, warn};

pub use pool::{PoolKind, RegionPool, BLOCK_ALIGN};
pub use stats::AllocStats;

/// Where fresh blocks are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Minimum request size that prefers the extended pool
    pub threshold_bytes: usize,
    pub prefer_extended: bool,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self::from(&AllocatorConfig::default())
    }
}

impl From<&AllocatorConfig> for PlacementPolicy {
    fn from(config: &AllocatorConfig) -> Self {
        Self {
            threshold_bytes: config.threshold_bytes,
            prefer_extended: config.prefer_extended,
        }
    }
}

/// An owned block of script heap. Must be handed back to the allocator that
/// produced it through [`HeterogeneousAllocator::free_block`].
#[derive(Debug)]
pub struct HeapBlock {
    ptr: NonNull<u8>,
    len: usize,
}

impl HeapBlock {
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Allocator serving every allocation the script runtime makes.
///
/// Single-threaded: it is only ever driven from the runtime's own thread.
#[derive(Debug)]
pub struct HeterogeneousAllocator {
    policy: PlacementPolicy,
    near: RegionPool,
    extended: RegionPool,
    stats: AllocStats,
}

impl HeterogeneousAllocator {
    pub fn new(policy: PlacementPolicy, near_capacity: usize, extended_capacity: usize) -> Self {
        Self {
            policy,
            near: RegionPool::new(PoolKind::Near, near_capacity),
            extended: RegionPool::new(PoolKind::Extended, extended_capacity),
            stats: AllocStats::default(),
        }
    }

    pub fn from_config(config: &AllocatorConfig) -> Self {
        Self::new(
            PlacementPolicy::from(config),
            config.near_capacity,
            config.extended_capacity,
        )
    }

    pub fn policy(&self) -> PlacementPolicy {
        self.policy
    }

    pub fn stats(&self) -> AllocStats {
        self.stats
    }

    pub fn free_bytes(&self, pool: PoolKind) -> usize {
        self.pool(pool).free_bytes()
    }

    pub fn capacity(&self, pool: PoolKind) -> usize {
        self.pool(pool).capacity()
    }

    fn pool(&self, kind: PoolKind) -> &RegionPool {
        match kind {
            PoolKind::Near => &self.near,
            PoolKind::Extended => &self.extended,
        }
    }

    fn pool_mut(&mut self, kind: PoolKind) -> &mut RegionPool {
        match kind {
            PoolKind::Near => &mut self.near,
            PoolKind::Extended => &mut self.extended,
        }
    }

    /// Pool holding the live block that starts at `ptr`
    pub fn pool_of(&self, ptr: NonNull<u8>) -> Option<PoolKind> {
        [PoolKind::Near, PoolKind::Extended]
            .into_iter()
            .find(|kind| self.pool(*kind).block_size(ptr).is_some())
    }

    /// The runtime's single allocation entry point.
    ///
    /// - `new_size == 0` frees `ptr` (if any) and returns `None`.
    /// - `ptr == None` places a fresh block.
    /// - Otherwise the block moves to a freshly placed one; the first
    ///   `min(old_size, new_size)` bytes are copied. On failure the original
    ///   block is left untouched and `None` is returned.
    pub fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        match (ptr, new_size) {
            (Some(ptr), 0) => {
                self.release(ptr);
                None
            }
            (None, 0) => None,
            (None, size) => self.place(size),
            (Some(ptr), size) => self.resize(ptr, old_size, size),
        }
    }

    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.reallocate(None, 0, size)
    }

    pub fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        self.reallocate(Some(ptr), size, 0);
    }

    pub fn allocate_block(&mut self, size: usize) -> Option<HeapBlock> {
        self.place(size).map(|ptr| HeapBlock { ptr, len: size })
    }

    pub fn free_block(&mut self, block: HeapBlock) {
        self.release(block.ptr);
    }

    /// Contents of a live block, at most its requested size
    pub fn bytes(&self, ptr: NonNull<u8>, len: usize) -> Option<&[u8]> {
        let kind = self.pool_of(ptr)?;
        self.pool(kind).bytes(ptr, len)
    }

    pub fn bytes_mut(&mut self, ptr: NonNull<u8>, len: usize) -> Option<&mut [u8]> {
        let kind = self.pool_of(ptr)?;
        self.pool_mut(kind).bytes_mut(ptr, len)
    }

    fn placement_order(&self, size: usize) -> [PoolKind; 2] {
        let extended_first = self.policy.prefer_extended
            && size >= self.policy.threshold_bytes
            && self.extended.free_bytes() >= size;
        if extended_first {
            [PoolKind::Extended, PoolKind::Near]
        } else {
            [PoolKind::Near, PoolKind::Extended]
        }
    }

    fn place(&mut self, size: usize) -> Option<NonNull<u8>> {
        let order = self.placement_order(size);
        for (attempt, kind) in order.into_iter().enumerate() {
            if let Some(ptr) = self.pool_mut(kind).allocate(size) {
                if attempt > 0 {
                    debug!(target: "alloc", "{} bytes fell back to the {} pool", size, kind);
                }
                self.stats.record_alloc(kind, size);
                trace!(target: "alloc", "alloc {} bytes in {} pool at {:p}", size, kind, ptr);
                return Some(ptr);
            }
        }
        warn!(
            target: "alloc",
            "Out of memory: {} bytes requested, {} near / {} extended free",
            size,
            self.near.free_bytes(),
            self.extended.free_bytes()
        );
        None
    }

    fn resize(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>> {
        let Some(kind) = self.pool_of(ptr) else {
            warn!(target: "alloc", "Resize of unknown block {:p} refused", ptr);
            return None;
        };
        let held = self.pool(kind).block_size(ptr).unwrap_or(0);
        let new_ptr = self.place(new_size)?;

        let copy_len = old_size.min(held).min(new_size);
        if copy_len > 0 {
            // SAFETY: both blocks are live, distinct and at least copy_len long
            unsafe { std::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), copy_len) };
        }
        self.release(ptr);
        Some(new_ptr)
    }

    fn release(&mut self, ptr: NonNull<u8>) {
        let Some(kind) = self.pool_of(ptr) else {
            warn!(target: "alloc", "Free of unknown block {:p} ignored", ptr);
            return;
        };
        if let Some(size) = self.pool_mut(kind).deallocate(ptr) {
            self.stats.record_free(kind, size);
            trace!(target: "alloc", "free {} bytes in {} pool at {:p}", size, kind, ptr);
        }
    }

    /// Report the aggregate counters
    pub fn log_stats(&self, label: &str) {
        let s = &self.stats;
        info!(
            target: "alloc",
            "Memory stats ({}): total={} near={} extended={} peak={} (near {} / extended {}) allocs={} frees={}",
            label,
            s.total_allocated,
            s.near_allocated,
            s.extended_allocated,
            s.peak_total,
            s.peak_near,
            s.peak_extended,
            s.alloc_count,
            s.free_count
        );
        info!(
            target: "alloc",
            "Free memory ({}): near={} extended={}",
            label,
            self.near.free_bytes(),
            self.extended.free_bytes()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(near: usize, extended: usize) -> HeterogeneousAllocator {
        HeterogeneousAllocator::new(
            PlacementPolicy {
                threshold_bytes: 16,
                prefer_extended: true,
            },
            near,
            extended,
        )
    }

    fn assert_balanced(heap: &HeterogeneousAllocator) {
        let s = heap.stats();
        assert_eq!(s.total_allocated, s.near_allocated + s.extended_allocated);
    }

    #[test]
    fn test_threshold_placement() {
        let mut heap = allocator(4096, 16384);
        let small = heap.allocate(8).unwrap();
        let large = heap.allocate(4096).unwrap();

        assert_eq!(heap.pool_of(small), Some(PoolKind::Near));
        assert_eq!(heap.pool_of(large), Some(PoolKind::Extended));
        assert_eq!(heap.stats().near_allocated, 8);
        assert_eq!(heap.stats().extended_allocated, 4096);
        assert_balanced(&heap);

        heap.deallocate(small, 8);
        heap.deallocate(large, 4096);
        assert_eq!(heap.stats().near_allocated, 0);
        assert_eq!(heap.stats().extended_allocated, 0);
        assert_eq!(heap.stats().free_count, 2);
    }

    #[test]
    fn test_prefer_extended_off_keeps_near() {
        let mut heap = HeterogeneousAllocator::new(
            PlacementPolicy {
                threshold_bytes: 16,
                prefer_extended: false,
            },
            4096,
            4096,
        );
        let block = heap.allocate(1024).unwrap();
        assert_eq!(heap.pool_of(block), Some(PoolKind::Near));
    }

    #[test]
    fn test_falls_back_between_pools() {
        let mut heap = allocator(64, 64);

        let a = heap.allocate(48).unwrap();
        assert_eq!(heap.pool_of(a), Some(PoolKind::Extended));

        // Extended too small for the request: goes near
        let b = heap.allocate(64).unwrap();
        assert_eq!(heap.pool_of(b), Some(PoolKind::Near));

        // Below threshold with near full: goes extended
        let c = heap.allocate(8).unwrap();
        assert_eq!(heap.pool_of(c), Some(PoolKind::Extended));

        assert!(heap.allocate(32).is_none());
        assert_balanced(&heap);
        assert_eq!(heap.stats().alloc_count, 3);
    }

    #[test]
    fn test_resize_preserves_prefix() {
        let mut heap = allocator(1024, 1024);
        let ptr = heap.allocate(8).unwrap();
        heap.bytes_mut(ptr, 8).unwrap().copy_from_slice(b"abcdefgh");

        let grown = heap.reallocate(Some(ptr), 8, 100).unwrap();
        assert_eq!(heap.pool_of(grown), Some(PoolKind::Extended));
        assert_eq!(heap.bytes(grown, 8).unwrap(), b"abcdefgh");
        assert!(heap.pool_of(ptr).is_none());

        let shrunk = heap.reallocate(Some(grown), 100, 4).unwrap();
        assert_eq!(heap.bytes(shrunk, 4).unwrap(), b"abcd");
        assert_eq!(heap.stats().total_allocated, 4);
        assert_balanced(&heap);
    }

    #[test]
    fn test_failed_resize_leaves_block_intact() {
        let mut heap = allocator(64, 0);
        let ptr = heap.allocate(32).unwrap();
        heap.bytes_mut(ptr, 32).unwrap().fill(0x5a);
        let before = heap.stats();

        assert!(heap.reallocate(Some(ptr), 32, 48).is_none());
        assert_eq!(heap.pool_of(ptr), Some(PoolKind::Near));
        assert!(heap.bytes(ptr, 32).unwrap().iter().all(|b| *b == 0x5a));
        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn test_zero_size_frees() {
        let mut heap = allocator(256, 256);
        assert!(heap.reallocate(None, 0, 0).is_none());

        let ptr = heap.allocate(32).unwrap();
        assert!(heap.reallocate(Some(ptr), 32, 0).is_none());
        assert_eq!(heap.stats().total_allocated, 0);
        assert_eq!(heap.free_bytes(PoolKind::Extended), 256);
    }

    #[test]
    fn test_foreign_pointer_ignored() {
        let mut heap = allocator(256, 256);
        let mut other = allocator(256, 256);
        let foreign = other.allocate(8).unwrap();

        heap.deallocate(foreign, 8);
        assert!(heap.reallocate(Some(foreign), 8, 16).is_none());
        assert_eq!(heap.stats(), AllocStats::default());
    }

    #[test]
    fn test_blocks() {
        let mut heap = allocator(256, 256);
        let block = heap.allocate_block(24).unwrap();
        assert_eq!(block.len(), 24);
        assert_eq!(heap.stats().live_blocks(), 1);
        heap.free_block(block);
        assert_eq!(heap.stats().live_blocks(), 0);
    }
}
