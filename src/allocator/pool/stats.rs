//! Pool allocator statistics.

/// Snapshot of a pool's activity, taken with
/// [`PoolAllocator::stats`](super::PoolAllocator::stats).
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Total allocation requests served (pooled and delegated).
    pub allocations: u64,
    /// Total deallocation requests served (pooled and delegated).
    pub deallocations: u64,
    /// Free-list refills performed.
    pub refills: u64,
    /// Free blocks repurposed as slab space after a failed slab growth.
    pub scavenges: u64,
    /// Cumulative bytes requested from the system for slab space.
    ///
    /// Monotonically non-decreasing; sizes the next slab request.
    pub heap_size: usize,
    /// Blocks currently sitting on the free lists, across all size
    /// classes.
    pub free_blocks: usize,
}
