//! The byte-allocator capability.

use core::ptr::NonNull;

use crate::error::AllocResult;

/// Byte-oriented allocator with a fixed alignment guarantee.
///
/// All blocks handed out by an implementation are aligned to at least
/// [`ALIGN`](crate::ALIGN) bytes. Sizes are plain byte counts; there is no
/// per-block metadata, so the caller carries the size from allocation to
/// deallocation.
///
/// # Safety
///
/// Implementors must ensure that:
/// - a pointer returned by [`allocate`](RawAllocator::allocate) is valid
///   for reads and writes of the requested size, aligned to
///   [`ALIGN`](crate::ALIGN), and not aliased by any other live block;
/// - [`deallocate`](RawAllocator::deallocate) invalidates the block, and
///   the memory may be reused by a later allocation.
pub unsafe trait RawAllocator {
    /// Allocates a block of at least `size` bytes.
    ///
    /// The returned memory is uninitialized.
    ///
    /// # Safety
    ///
    /// `size` must be non-zero, and the block must later be released with
    /// the same `size` (or carried through
    /// [`reallocate`](RawAllocator::reallocate)).
    unsafe fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>>;

    /// Releases a block previously returned by
    /// [`allocate`](RawAllocator::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with exactly
    /// `size` bytes, and must not be used afterwards. Double-free is
    /// undefined behavior. The size is trusted: no implementation stores
    /// per-block metadata to check it against.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize);

    /// Resizes a block, preserving `min(old_size, new_size)` bytes of its
    /// contents.
    ///
    /// The default implementation allocates a fresh block, copies, and
    /// releases the old one. Implementations override it where a cheaper
    /// path exists.
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with exactly
    /// `old_size` bytes; on success the old pointer is invalid.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> AllocResult<NonNull<u8>> {
        // SAFETY: forwarded contracts; the regions cannot overlap because
        // `new_ptr` is a live allocation distinct from `ptr`.
        unsafe {
            let new_ptr = self.allocate(new_size)?;
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.as_ptr(),
                core::cmp::min(old_size, new_size),
            );
            self.deallocate(ptr, old_size);
            Ok(new_ptr)
        }
    }
}

// SAFETY: forwards every call to the underlying allocator, preserving its
// contracts unchanged.
unsafe impl<T: RawAllocator + ?Sized> RawAllocator for &T {
    unsafe fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        // SAFETY: same contract as `T::allocate`.
        unsafe { (**self).allocate(size) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: same contract as `T::deallocate`.
        unsafe { (**self).deallocate(ptr, size) }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> AllocResult<NonNull<u8>> {
        // SAFETY: same contract as `T::reallocate`.
        unsafe { (**self).reallocate(ptr, old_size, new_size) }
    }
}
