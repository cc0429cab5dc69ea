//! A thread-safe object pool that hands out stable, individually addressable slots for values
//! of one type, drawn from fixed-capacity blocks.
//!
//! This crate provides [`Pool`], which grows by whole blocks of slots and never moves or frees a
//! block while slots in it may be held, so a slot's address stays put for as long as the slot is
//! occupied. Slots are handed out first-fit and their values are dropped when released.
//!
//! # Key Features
//!
//! - **Stable addresses**: blocks are allocated once and never moved or resized
//! - **Thread safety**: one lock per pool guards all bookkeeping; slot contents are reached
//!   through ownership, not through the lock
//! - **Misuse is an error, not undefined behavior**: [`SlotKey`] is move-only and remembers the
//!   pool and the epoch that issued it, so foreign, stale and double releases are rejected
//! - **Scoped ownership**: [`ScopedHandle`] acquires a slot on construction and releases it on
//!   every exit path, including early returns and unwinding
//! - **Process-wide pools**: `u8`, `i32` and `f64` have a lazily created global pool via
//!   [`Registered`]
//! - **Configurable growth**: block capacity, an optional block limit and a [`DropPolicy`] via
//!   [`PoolBuilder`]
//!
//! # Examples
//!
//! ## Scoped handles
//!
//! ```rust
//! use slot_pool::{Pool, ScopedHandle};
//!
//! let pool = Pool::<i32>::new();
//!
//! {
//!     let mut value = ScopedHandle::new(&pool);
//!     *value = 42;
//!     assert_eq!(*value, 42);
//!     assert_eq!(pool.len(), 1);
//! }
//!
//! // The handle released its slot when it went out of scope.
//! assert!(pool.is_empty());
//! ```
//!
//! ## Explicit keys
//!
//! ```rust
//! use slot_pool::{Error, Pool};
//!
//! let first = Pool::<u64>::builder().block_capacity(4).build();
//! let second = Pool::<u64>::builder().block_capacity(4).build();
//!
//! let key = first.allocate_with(7).unwrap();
//! assert_eq!(first.with_value(&key, |value| *value).unwrap(), 7);
//!
//! // A key only works with the pool that issued it.
//! let other = second.allocate().unwrap();
//! assert_eq!(first.deallocate(other), Err(Error::ForeignKey));
//!
//! first.deallocate(key).unwrap();
//! assert_eq!(first.stats().allocated(), 0);
//! ```
//!
//! ## Process-wide pools
//!
//! ```rust
//! use slot_pool::{Registered, ScopedHandle};
//!
//! let mut byte = ScopedHandle::<u8>::global();
//! *byte = b'a';
//!
//! assert_eq!(u8::global_pool().block_capacity(), 4096);
//! ```

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod block;
mod builder;
mod drop_policy;
mod error;
mod handle;
mod key;
mod pool;
mod registry;
mod stats;

pub(crate) use block::*;
pub use builder::PoolBuilder;
pub use drop_policy::*;
pub use error::*;
pub use handle::ScopedHandle;
pub use key::*;
pub use pool::Pool;
pub use registry::Registered;
pub use stats::*;
