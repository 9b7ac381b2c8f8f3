//! Segregated-size pooled allocator.
//!
//! Requests up to [`MAX_POOLED_BYTES`] are rounded up to a multiple of
//! [`ALIGN`] and served from the free list of the matching size class.
//! Empty lists are refilled by carving a batch of blocks out of a
//! bump-allocated slab; the slab itself grows through the system
//! allocator, with the request size scaled by cumulative demand so that
//! the cost of hitting the system is amortized across many small
//! allocations. Requests above the pooled ceiling bypass all of this and
//! go straight to the system allocator.
//!
//! The pool is an explicitly constructed context object. Cloning a
//! [`PoolAllocator`] yields another handle to the same pool; the backing
//! slabs are released when the last handle drops. Blocks referenced only
//! by raw pointers must not outlive the pool they came from.

mod config;
mod stats;

pub use config::PoolConfig;
pub use stats::PoolStats;

use core::cell::{Cell, RefCell};
use core::fmt;
use core::ptr::{self, NonNull};
use std::rc::Rc;

use tracing::{debug, trace};

use super::{ALIGN, FreeList, RawAllocator, SystemAllocator};
use crate::error::AllocResult;

/// Largest request, in bytes, served from the pool's free lists.
///
/// Anything larger is delegated to the system allocator.
pub const MAX_POOLED_BYTES: usize = 128;

/// Number of size classes (one free list per `ALIGN`-byte step).
pub const FREE_LIST_COUNT: usize = MAX_POOLED_BYTES / ALIGN;

/// Rounds a byte count up to the nearest multiple of [`ALIGN`].
///
/// Idempotent: `round_up(round_up(n)) == round_up(n)`.
pub const fn round_up(bytes: usize) -> usize {
    (bytes + ALIGN - 1) & !(ALIGN - 1)
}

/// Maps a byte count in `(0, MAX_POOLED_BYTES]` to its size-class index.
///
/// All sizes sharing one rounded-up value share one class:
/// `class_index(round_up(n)) == class_index(n)`.
pub const fn class_index(bytes: usize) -> usize {
    debug_assert!(bytes > 0);
    (bytes + ALIGN - 1) / ALIGN - 1
}

/// One contiguous region obtained from the system for slab space.
struct Chunk {
    ptr: NonNull<u8>,
    size: usize,
}

/// Shared pool state behind every [`PoolAllocator`] handle.
struct PoolState {
    free_lists: [FreeList; FREE_LIST_COUNT],
    /// Bump cursor of the current slab; `slab_start <= slab_end`, and the
    /// un-carved remainder `slab_end - slab_start` is always a multiple
    /// of [`ALIGN`].
    slab_start: Cell<*mut u8>,
    slab_end: Cell<*mut u8>,
    /// Cumulative bytes requested from the system for slab space. Never
    /// decreases; feeds the size of the next slab request.
    heap_size: Cell<usize>,
    /// Every region obtained from the system, so `Drop` can return them.
    chunks: RefCell<Vec<Chunk>>,
    system: SystemAllocator,
    config: PoolConfig,
    allocations: Cell<u64>,
    deallocations: Cell<u64>,
    refills: Cell<u64>,
    scavenges: Cell<u64>,
}

impl PoolState {
    fn new(config: PoolConfig) -> Self {
        assert!(config.refill_batch >= 1, "refill batch must be at least 1");
        PoolState {
            free_lists: core::array::from_fn(|_| FreeList::new()),
            slab_start: Cell::new(ptr::null_mut()),
            slab_end: Cell::new(ptr::null_mut()),
            heap_size: Cell::new(0),
            chunks: RefCell::new(Vec::new()),
            system: SystemAllocator::new(),
            config,
            allocations: Cell::new(0),
            deallocations: Cell::new(0),
            refills: Cell::new(0),
            scavenges: Cell::new(0),
        }
    }

    unsafe fn allocate_bytes(&self, size: usize) -> AllocResult<NonNull<u8>> {
        debug_assert!(size > 0, "pool allocation size must be non-zero");
        self.allocations.set(self.allocations.get() + 1);
        if size > MAX_POOLED_BYTES {
            return self.system.allocate(size);
        }
        if let Some(block) = self.free_lists[class_index(size)].pop() {
            return Ok(block);
        }
        self.refill(round_up(size))
    }

    unsafe fn deallocate_bytes(&self, ptr: NonNull<u8>, size: usize) {
        debug_assert!(size > 0, "pool deallocation size must be non-zero");
        self.deallocations.set(self.deallocations.get() + 1);
        if size > MAX_POOLED_BYTES {
            // SAFETY: blocks above the ceiling were delegated to the
            // system at allocation time with this same size.
            unsafe { self.system.deallocate(ptr, size) };
            return;
        }
        // SAFETY: the block was handed out by this pool for `size` bytes,
        // so it spans round_up(size) >= ALIGN writable bytes, is
        // word-aligned, and the caller no longer uses it.
        unsafe { self.free_lists[class_index(size)].push(ptr) };
    }

    unsafe fn reallocate_bytes(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> AllocResult<NonNull<u8>> {
        if old_size > MAX_POOLED_BYTES && new_size > MAX_POOLED_BYTES {
            // SAFETY: the block lives with the system allocator; caller's
            // contract carries over.
            return unsafe { self.system.reallocate(ptr, old_size, new_size) };
        }
        if round_up(old_size) == round_up(new_size) {
            // Same physical block size; nothing to move.
            return Ok(ptr);
        }
        // The pool has no notion of adjacent free space to extend into:
        // move the contents to a freshly sized block.
        // SAFETY: the new block is a distinct live allocation, so the
        // copy regions cannot overlap; the old block is released with its
        // allocation-time size per the caller's contract.
        unsafe {
            let new_ptr = self.allocate_bytes(new_size)?;
            ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.as_ptr(),
                core::cmp::min(old_size, new_size),
            );
            self.deallocate_bytes(ptr, old_size);
            Ok(new_ptr)
        }
    }

    /// Refills the free list of `size`'s class and returns one block.
    ///
    /// `size` must already be rounded to a multiple of [`ALIGN`].
    fn refill(&self, size: usize) -> AllocResult<NonNull<u8>> {
        debug_assert_eq!(size, round_up(size));
        debug_assert!(
            self.free_lists[class_index(size)].is_empty(),
            "refill is only reached when the class list is drained"
        );
        let mut batch = self.config.refill_batch;
        let chunk = self.chunk_alloc(size, &mut batch)?;
        self.refills.set(self.refills.get() + 1);
        if batch > 1 {
            let list = &self.free_lists[class_index(size)];
            for i in 1..batch {
                // SAFETY: chunk_alloc carved `batch * size` contiguous
                // bytes, so block `i` starts within the carved region and
                // spans `size >= ALIGN` bytes nothing else owns.
                unsafe { list.push(NonNull::new_unchecked(chunk.as_ptr().add(i * size))) };
            }
        }
        Ok(chunk)
    }

    /// Carves `*batch` blocks of `size` bytes out of the slab, growing it
    /// if needed. May shrink `*batch` to the number of blocks that fit.
    ///
    /// Runs as an explicit loop with ordered fallbacks: carve, grow via a
    /// single system attempt, scavenge larger classes for a block to
    /// repurpose as slab space, and finally the retry-loop system request
    /// that may invoke the out-of-memory handler or terminate.
    fn chunk_alloc(&self, size: usize, batch: &mut usize) -> AllocResult<NonNull<u8>> {
        loop {
            let start = self.slab_start.get();
            let left = self.slab_end.get() as usize - start as usize;
            let needed = size * *batch;

            if left >= needed {
                // SAFETY: `needed > 0 <= left`, so `start` is a non-null
                // cursor into the live slab and the carve stays in range.
                unsafe {
                    self.slab_start.set(start.add(needed));
                    return Ok(NonNull::new_unchecked(start));
                }
            }

            if left >= size {
                // Not a full batch, but at least one block fits.
                *batch = left / size;
                let carved = *batch * size;
                // SAFETY: as above; `carved <= left`.
                unsafe {
                    self.slab_start.set(start.add(carved));
                    return Ok(NonNull::new_unchecked(start));
                }
            }

            // Slab exhausted. Bank any remainder on its matching free
            // list first; the remainder is a multiple of ALIGN below
            // `size`, so it always has a class.
            if left >= ALIGN {
                debug_assert_eq!(left % ALIGN, 0);
                // SAFETY: the remainder is `left` unowned bytes of the
                // live slab, word-aligned by the carve invariant.
                unsafe {
                    self.free_lists[class_index(left)].push(NonNull::new_unchecked(start));
                }
                self.slab_start.set(self.slab_end.get());
            }

            let bytes_to_get = 2 * needed + round_up(self.heap_size.get() >> 4);

            if let Some(region) = self.system.try_allocate(bytes_to_get) {
                self.adopt_region(region, bytes_to_get);
                trace!(
                    bytes = bytes_to_get,
                    heap_size = self.heap_size.get(),
                    "grew pool slab"
                );
                continue;
            }

            if let Some((block, block_size)) = self.scavenge(size) {
                debug!(
                    block_size,
                    "system refused slab growth, repurposing a free block"
                );
                self.set_slab(block.as_ptr(), block_size);
                continue;
            }

            // Last resort: the retry-loop flavor. Either the handler
            // frees enough memory for this to return, or it terminates.
            let region = self.system.allocate(bytes_to_get)?;
            self.adopt_region(region, bytes_to_get);
        }
    }

    /// Scans classes `size ..= MAX_POOLED_BYTES` for a free block to
    /// repurpose as slab space.
    fn scavenge(&self, size: usize) -> Option<(NonNull<u8>, usize)> {
        let mut probe = size;
        while probe <= MAX_POOLED_BYTES {
            if let Some(block) = self.free_lists[class_index(probe)].pop() {
                self.scavenges.set(self.scavenges.get() + 1);
                return Some((block, probe));
            }
            probe += ALIGN;
        }
        None
    }

    /// Records a freshly obtained system region and makes it the slab.
    fn adopt_region(&self, region: NonNull<u8>, bytes: usize) {
        self.chunks.borrow_mut().push(Chunk { ptr: region, size: bytes });
        self.heap_size.set(self.heap_size.get() + bytes);
        self.set_slab(region.as_ptr(), bytes);
    }

    fn set_slab(&self, start: *mut u8, bytes: usize) {
        self.slab_start.set(start);
        // SAFETY: `start .. start + bytes` is a single live region.
        self.slab_end.set(unsafe { start.add(bytes) });
    }

    fn free_blocks(&self) -> usize {
        self.free_lists.iter().map(FreeList::len).sum()
    }
}

impl Drop for PoolState {
    fn drop(&mut self) {
        for chunk in self.chunks.get_mut().drain(..) {
            // SAFETY: each region came from `self.system` with exactly
            // this size. The last handle is gone, so no block carved out
            // of the region is reachable anymore.
            unsafe { self.system.deallocate(chunk.ptr, chunk.size) };
        }
    }
}

/// Handle to a segregated-size pooled allocator.
///
/// Cloning is cheap and yields another handle to the same pool, so
/// several consumers can recycle each other's blocks. The slabs are
/// returned to the system when the last handle drops.
///
/// Not `Send` or `Sync`: pool state is unsynchronized by design.
#[derive(Clone)]
pub struct PoolAllocator {
    state: Rc<PoolState>,
}

impl PoolAllocator {
    /// Creates a pool with the default configuration.
    ///
    /// No slab space is requested until the first allocation.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a pool with a custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if `config.refill_batch` is zero.
    pub fn with_config(config: PoolConfig) -> Self {
        PoolAllocator {
            state: Rc::new(PoolState::new(config)),
        }
    }

    /// The system allocator backing this pool.
    ///
    /// Use this to install an out-of-memory handler for slab growth and
    /// for delegated large requests.
    pub fn system(&self) -> &SystemAllocator {
        &self.state.system
    }

    /// Takes a snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.state.allocations.get(),
            deallocations: self.state.deallocations.get(),
            refills: self.state.refills.get(),
            scavenges: self.state.scavenges.get(),
            heap_size: self.state.heap_size.get(),
            free_blocks: self.state.free_blocks(),
        }
    }

    /// Number of handles (including this one) sharing the pool.
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.state)
    }
}

impl Default for PoolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("heap_size", &self.state.heap_size.get())
            .field("free_blocks", &self.state.free_blocks())
            .field("refill_batch", &self.state.config.refill_batch)
            .finish()
    }
}

// SAFETY: pooled blocks are carved from slab regions in round_up(size)
// steps and recycled through the class free lists, so every block handed
// out is ALIGN-aligned, spans at least the requested size, and is owned
// by exactly one caller until deallocated. Oversized requests inherit the
// system allocator's guarantees.
unsafe impl RawAllocator for PoolAllocator {
    unsafe fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        // SAFETY: same contract as the trait method.
        unsafe { self.state.allocate_bytes(size) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: same contract as the trait method.
        unsafe { self.state.deallocate_bytes(ptr, size) }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> AllocResult<NonNull<u8>> {
        // SAFETY: same contract as the trait method.
        unsafe { self.state.reallocate_bytes(ptr, old_size, new_size) }
    }
}
