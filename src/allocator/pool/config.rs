//! Pool allocator configuration.

/// Configuration for [`PoolAllocator`](super::PoolAllocator).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of blocks a free-list refill tries to carve from the slab
    /// in one step.
    ///
    /// Larger batches amortize slab bookkeeping over more allocations at
    /// the cost of holding more carved-but-unused blocks per size class.
    /// Must be at least 1; the refill shrinks the batch on its own when
    /// the slab cannot supply all of it.
    pub refill_batch: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig { refill_batch: 20 }
    }
}

impl PoolConfig {
    /// Configuration with a custom refill batch size.
    #[must_use]
    pub fn with_refill_batch(refill_batch: usize) -> Self {
        PoolConfig { refill_batch }
    }
}
