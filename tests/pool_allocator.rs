//! Integration tests for the pooled allocator.

use segpool::{MAX_POOLED_BYTES, PoolAllocator, PoolConfig, RawAllocator};

#[test]
fn test_pool_allocator_basic() {
    let pool = PoolAllocator::new();

    unsafe {
        let ptr = pool.allocate(64).expect("allocation failed");

        // Write to allocated memory.
        std::ptr::write_bytes(ptr.as_ptr(), 0x42, 64);
        assert_eq!(*ptr.as_ptr(), 0x42);

        pool.deallocate(ptr, 64);
    }
}

#[test]
fn test_pool_allocator_reuse() {
    let pool = PoolAllocator::new();

    unsafe {
        // Allocate, deallocate, allocate again: the free list hands the
        // same block back.
        let ptr1 = pool.allocate(48).expect("first allocation failed");
        let addr1 = ptr1.as_ptr() as usize;

        pool.deallocate(ptr1, 48);

        let ptr2 = pool.allocate(48).expect("second allocation failed");
        let addr2 = ptr2.as_ptr() as usize;

        assert_eq!(addr1, addr2, "pool should reuse freed blocks");

        pool.deallocate(ptr2, 48);
    }
}

#[test]
fn test_pool_allocator_multiple_blocks() {
    let pool = PoolAllocator::new();

    unsafe {
        let mut ptrs = vec![];
        for i in 0..30 {
            let ptr = pool.allocate(32).expect("allocation failed");
            std::ptr::write_bytes(ptr.as_ptr(), i as u8, 32);
            ptrs.push(ptr);
        }

        // All blocks are distinct.
        for i in 0..ptrs.len() {
            for j in (i + 1)..ptrs.len() {
                assert_ne!(ptrs[i], ptrs[j]);
            }
        }

        // Contents survive neighboring allocations.
        for (i, ptr) in ptrs.iter().enumerate() {
            assert_eq!(*ptr.as_ptr(), i as u8);
        }

        for ptr in ptrs {
            pool.deallocate(ptr, 32);
        }
    }
}

#[test]
fn test_pool_allocator_size_class_rounding() {
    let pool = PoolAllocator::new();

    unsafe {
        // 9..=16 all land in the 16-byte class and recycle one block.
        let ptr = pool.allocate(9).expect("allocation failed");
        pool.deallocate(ptr, 9);

        for size in 10..=16usize {
            let again = pool.allocate(size).expect("allocation failed");
            assert_eq!(ptr, again, "size {size} should share the 16-byte class");
            pool.deallocate(again, size);
        }
    }
}

#[test]
fn test_pool_allocator_large_requests_bypass_pool() {
    let pool = PoolAllocator::new();

    unsafe {
        let ptr = pool
            .allocate(MAX_POOLED_BYTES * 4)
            .expect("large allocation failed");
        std::ptr::write_bytes(ptr.as_ptr(), 0x7F, MAX_POOLED_BYTES * 4);
        pool.deallocate(ptr, MAX_POOLED_BYTES * 4);
    }

    let stats = pool.stats();
    assert_eq!(stats.heap_size, 0, "delegated requests must not grow the slab");
    assert_eq!(stats.allocations, 1);
    assert_eq!(stats.deallocations, 1);
}

#[test]
fn test_pool_allocator_reallocate_same_class_is_identity() {
    let pool = PoolAllocator::new();

    unsafe {
        let ptr = pool.allocate(33).expect("allocation failed");
        // 33 and 40 both round up to 40 bytes.
        let same = pool.reallocate(ptr, 33, 40).expect("reallocation failed");
        assert_eq!(ptr, same);
        pool.deallocate(same, 40);
    }
}

#[test]
fn test_pool_allocator_reallocate_moves_across_classes() {
    let pool = PoolAllocator::new();

    unsafe {
        let ptr = pool.allocate(16).expect("allocation failed");
        for i in 0..16 {
            ptr.as_ptr().add(i).write(i as u8);
        }

        let moved = pool.reallocate(ptr, 16, 96).expect("reallocation failed");
        for i in 0..16 {
            assert_eq!(*moved.as_ptr().add(i), i as u8, "byte {i} lost in move");
        }

        pool.deallocate(moved, 96);
    }
}

#[test]
fn test_pool_allocator_custom_refill_batch() {
    let pool = PoolAllocator::with_config(PoolConfig::with_refill_batch(4));

    unsafe {
        let ptr = pool.allocate(8).expect("allocation failed");
        // One block handed out, three banked.
        assert_eq!(pool.stats().free_blocks, 3);
        pool.deallocate(ptr, 8);
    }
    assert_eq!(pool.stats().free_blocks, 4);
}

#[test]
fn test_pool_allocator_shared_handles() {
    let pool = PoolAllocator::new();
    let clone = pool.clone();

    unsafe {
        let ptr = pool.allocate(56).expect("allocation failed");
        clone.deallocate(ptr, 56);

        // The clone's free list is the original's free list.
        let again = clone.allocate(56).expect("allocation failed");
        assert_eq!(ptr, again);
        pool.deallocate(again, 56);
    }

    assert_eq!(pool.stats().allocations, clone.stats().allocations);
}

#[test]
fn test_pool_allocator_stress_churn() {
    let pool = PoolAllocator::new();

    unsafe {
        for round in 0..100u8 {
            let mut ptrs = vec![];
            for _ in 0..10 {
                let ptr = pool.allocate(80).expect("allocation failed");
                std::ptr::write_bytes(ptr.as_ptr(), round, 80);
                ptrs.push(ptr);
            }
            for ptr in &ptrs {
                assert_eq!(*ptr.as_ptr(), round);
            }
            for ptr in ptrs {
                pool.deallocate(ptr, 80);
            }
        }
    }

    // Steady-state churn settles on recycled blocks: the slab stops
    // growing after the early rounds.
    let stats = pool.stats();
    assert_eq!(stats.allocations, 1000);
    assert_eq!(stats.deallocations, 1000);
    assert!(stats.refills <= 2, "churn must reuse freed blocks");
}
