use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::{DropPolicy, Pool};

/// Slots per block unless configured otherwise.
#[cfg(not(miri))]
pub(crate) const DEFAULT_BLOCK_CAPACITY: usize = 1024;

// Miri test runtime scales with memory usage, so we keep blocks tiny there.
#[cfg(miri)]
pub(crate) const DEFAULT_BLOCK_CAPACITY: usize = 4;

/// Builder for creating an instance of [`Pool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`Pool::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use slot_pool::{DropPolicy, Pool};
///
/// let pool = Pool::<u64>::builder()
///     .block_capacity(64)
///     .max_blocks(16)
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
///
/// assert_eq!(pool.block_capacity(), 64);
/// ```
///
/// [1]: Pool::new
#[must_use]
pub struct PoolBuilder<T> {
    block_capacity: usize,
    max_blocks: Option<usize>,
    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T> fmt::Debug for PoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("block_capacity", &self.block_capacity)
            .field("max_blocks", &self.max_blocks)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T> PoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            max_blocks: None,
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the number of slots in each block.
    ///
    /// Every block the pool ever creates has exactly this many slots, so the pool capacity is
    /// always a multiple of this value.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_pool::Pool;
    ///
    /// let pool = Pool::<u32>::builder().block_capacity(4).build();
    ///
    /// let key = pool.allocate().unwrap();
    /// assert_eq!(pool.stats().capacity(), 4);
    /// # pool.deallocate(key).unwrap();
    /// ```
    pub fn block_capacity(mut self, slots: usize) -> Self {
        self.block_capacity = slots;
        self
    }

    /// Limits how many blocks the pool may own.
    ///
    /// Once the limit is reached and every slot is occupied, allocation fails with
    /// [`Error::Exhausted`][crate::Error::Exhausted] instead of growing the pool.
    /// Without a limit, the pool only runs out when the memory allocator does.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_pool::{Error, Pool};
    ///
    /// let pool = Pool::<u32>::builder()
    ///     .block_capacity(2)
    ///     .max_blocks(1)
    ///     .build();
    ///
    /// let a = pool.allocate().unwrap();
    /// let b = pool.allocate().unwrap();
    /// assert!(matches!(pool.allocate(), Err(Error::Exhausted { .. })));
    /// # pool.deallocate(a).unwrap();
    /// # pool.deallocate(b).unwrap();
    /// ```
    pub fn max_blocks(mut self, blocks: usize) -> Self {
        self.max_blocks = Some(blocks);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat slots that are still occupied when the pool is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_pool::{DropPolicy, Pool};
    ///
    /// let pool = Pool::<u32>::builder()
    ///     .drop_policy(DropPolicy::MayDropItems)
    ///     .build();
    /// ```
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration.
    ///
    /// The pool starts without any blocks; the first allocation creates one.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or if the block capacity is zero.
    #[must_use]
    pub fn build(self) -> Pool<T> {
        assert!(
            self.block_capacity > 0,
            "Pool of {} must have non-zero block capacity",
            type_name::<T>()
        );

        Pool::new_inner(self.block_capacity, self.max_blocks, self.drop_policy)
    }
}
