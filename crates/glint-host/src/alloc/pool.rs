use std::alloc::{self, Layout};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ptr::NonNull;

use tracing::warn;

/// Alignment of every block handed out by a pool
pub const BLOCK_ALIGN: usize = 16;

/// Which memory region a block was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Small, fast internal memory
    Near,
    /// Larger, slower external memory
    Extended,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Near => write!(f, "near"),
            PoolKind::Extended => write!(f, "extended"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct UsedBlock {
    reserved: usize,
    requested: usize,
}

/// A fixed-size memory region carved into blocks with a first-fit free list.
///
/// Blocks are identified by their offset from the region base, so a pointer
/// can always be traced back to the pool it came from.
pub struct RegionPool {
    kind: PoolKind,
    base: NonNull<u8>,
    layout: Option<Layout>,
    capacity: usize,
    /// offset -> length, adjacent ranges always merged
    free: BTreeMap<usize, usize>,
    used: HashMap<usize, UsedBlock>,
    free_total: usize,
}

fn round_up(size: usize) -> Option<usize> {
    size.checked_add(BLOCK_ALIGN - 1)
        .map(|s| s & !(BLOCK_ALIGN - 1))
}

impl RegionPool {
    pub fn new(kind: PoolKind, capacity: usize) -> Self {
        let capacity = round_up(capacity).unwrap_or(0);
        let region = if capacity == 0 {
            None
        } else {
            Layout::from_size_align(capacity, BLOCK_ALIGN)
                .ok()
                .and_then(|layout| {
                    // SAFETY: layout has a non-zero size
                    let ptr = unsafe { alloc::alloc_zeroed(layout) };
                    NonNull::new(ptr).map(|ptr| (ptr, layout))
                })
        };

        match region {
            Some((base, layout)) => {
                let mut free = BTreeMap::new();
                free.insert(0, capacity);
                Self {
                    kind,
                    base,
                    layout: Some(layout),
                    capacity,
                    free,
                    used: HashMap::new(),
                    free_total: capacity,
                }
            }
            None => {
                if capacity != 0 {
                    warn!(target: "alloc", "Could not reserve {} bytes for the {} pool", capacity, kind);
                }
                Self {
                    kind,
                    base: NonNull::dangling(),
                    layout: None,
                    capacity: 0,
                    free: BTreeMap::new(),
                    used: HashMap::new(),
                    free_total: 0,
                }
            }
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_bytes(&self) -> usize {
        self.free_total
    }

    pub fn used_bytes(&self) -> usize {
        self.capacity - self.free_total
    }

    fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let base = self.base.as_ptr() as usize;
        let addr = ptr.as_ptr() as usize;
        (addr >= base && addr < base + self.capacity).then(|| addr - base)
    }

    /// Whether the pointer lies inside this pool's region
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.offset_of(ptr).is_some()
    }

    /// Requested size of the live block starting at `ptr`
    pub fn block_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = self.offset_of(ptr)?;
        self.used.get(&offset).map(|block| block.requested)
    }

    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let reserved = round_up(size)?;
        let (offset, len) = self
            .free
            .iter()
            .find(|(_, len)| **len >= reserved)
            .map(|(offset, len)| (*offset, *len))?;

        self.free.remove(&offset);
        if len > reserved {
            self.free.insert(offset + reserved, len - reserved);
        }
        self.free_total -= reserved;
        self.used.insert(
            offset,
            UsedBlock {
                reserved,
                requested: size,
            },
        );
        NonNull::new(self.base.as_ptr().wrapping_add(offset))
    }

    /// Return a block to the free list. Yields the size originally requested
    /// for it, or `None` if `ptr` does not start a live block of this pool.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = self.offset_of(ptr)?;
        let block = self.used.remove(&offset)?;

        let mut start = offset;
        let mut len = block.reserved;
        if let Some((&prev, &prev_len)) = self.free.range(..offset).next_back() {
            if prev + prev_len == offset {
                self.free.remove(&prev);
                start = prev;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free.remove(&(offset + block.reserved)) {
            len += next_len;
        }
        self.free.insert(start, len);
        self.free_total += block.reserved;
        Some(block.requested)
    }

    /// View the first `len` bytes of a live block
    pub fn bytes(&self, ptr: NonNull<u8>, len: usize) -> Option<&[u8]> {
        let offset = self.offset_of(ptr)?;
        let block = self.used.get(&offset)?;
        if len > block.reserved {
            return None;
        }
        // SAFETY: the range lies inside a live block of the zero-initialised region
        Some(unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) })
    }

    pub fn bytes_mut(&mut self, ptr: NonNull<u8>, len: usize) -> Option<&mut [u8]> {
        let offset = self.offset_of(ptr)?;
        let block = self.used.get(&offset)?;
        if len > block.reserved {
            return None;
        }
        // SAFETY: as in `bytes`, and `&mut self` guarantees exclusive access
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) })
    }
}

impl Drop for RegionPool {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            // SAFETY: base was returned by alloc_zeroed with this layout
            unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
        }
    }
}

impl fmt::Debug for RegionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionPool")
            .field("kind", &self.kind)
            .field("capacity", &self.capacity)
            .field("free", &self.free_total)
            .field("blocks", &self.used.len())
            .finish()
    }
}
