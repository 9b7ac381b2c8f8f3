//! Segregated-size pooled memory allocation with a growable array built on
//! top of it.
//!
//! The crate provides a small, single-threaded memory-management layer:
//!
//! - [`SystemAllocator`] — a thin pass-through to the platform allocator
//!   with an installable out-of-memory retry hook;
//! - [`PoolAllocator`] — a segregated-size pooled allocator that amortizes
//!   allocation cost for small, uniformly-sized objects by carving blocks
//!   out of bump-allocated slabs and recycling them through per-size-class
//!   free lists;
//! - [`TypedAllocator`] — a stateless façade turning byte-oriented
//!   allocation into an element-count-oriented API;
//! - [`Array`] — a contiguous growable sequence built directly on the
//!   typed façade. Its growth strategy and rollback behavior are the
//!   primary exerciser of the allocator contract.
//!
//! # Example
//!
//! ```
//! use segpool::{Array, PoolAllocator};
//!
//! let pool = PoolAllocator::new();
//! let mut values: Array<u32, _> = Array::new_in(pool.clone());
//! values.push(1);
//! values.push(2);
//! values.push(3);
//! assert_eq!(values.as_slice(), &[1, 2, 3]);
//!
//! // Handles share one pool: a second array recycles the same slabs.
//! let other: Array<u32, _> = Array::with_value_in(5, 9, pool.clone());
//! assert_eq!(other.len(), 5);
//! ```
//!
//! # Threading
//!
//! Every component here is deliberately single-threaded: pool state lives
//! in [`Cell`](core::cell::Cell)s, handles are [`Rc`](std::rc::Rc)-backed,
//! and nothing is `Sync`. Embedding the allocator in a multi-threaded
//! system requires external synchronization.

#![warn(missing_docs)]

pub mod allocator;
pub mod array;
pub mod error;

pub use allocator::pool::{MAX_POOLED_BYTES, PoolAllocator, PoolConfig, PoolStats};
pub use allocator::{ALIGN, OomHandler, RawAllocator, SystemAllocator, TypedAllocator};
pub use array::Array;
pub use error::{AllocError, AllocResult};
