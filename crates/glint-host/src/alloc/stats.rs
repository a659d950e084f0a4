use super::pool::PoolKind;

/// Aggregate counters over every live allocation.
///
/// `total_allocated == near_allocated + extended_allocated` holds after every
/// update; counters are only touched once the memory operation has succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub total_allocated: usize,
    pub near_allocated: usize,
    pub extended_allocated: usize,
    pub peak_total: usize,
    pub peak_near: usize,
    pub peak_extended: usize,
    pub alloc_count: u64,
    pub free_count: u64,
}

impl AllocStats {
    pub(crate) fn record_alloc(&mut self, pool: PoolKind, size: usize) {
        match pool {
            PoolKind::Near => {
                self.near_allocated += size;
                self.peak_near = self.peak_near.max(self.near_allocated);
            }
            PoolKind::Extended => {
                self.extended_allocated += size;
                self.peak_extended = self.peak_extended.max(self.extended_allocated);
            }
        }
        self.total_allocated += size;
        self.peak_total = self.peak_total.max(self.total_allocated);
        self.alloc_count += 1;
    }

    pub(crate) fn record_free(&mut self, pool: PoolKind, size: usize) {
        let counter = match pool {
            PoolKind::Near => &mut self.near_allocated,
            PoolKind::Extended => &mut self.extended_allocated,
        };
        let size = size.min(*counter);
        *counter -= size;
        self.total_allocated -= size;
        self.free_count += 1;
    }

    pub fn allocated(&self, pool: PoolKind) -> usize {
        match pool {
            PoolKind::Near => self.near_allocated,
            PoolKind::Extended => self.extended_allocated,
        }
    }

    /// Allocations not yet matched by a free
    pub fn live_blocks(&self) -> u64 {
        self.alloc_count.saturating_sub(self.free_count)
    }
}
