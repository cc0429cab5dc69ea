use std::any::type_name;
use std::fmt;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    Block, DropPolicy, Error, PoolBuilder, PoolStats, Result, SlotCoordinates, SlotKey,
};

/// Global counter for generating unique pool IDs.
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique pool ID, used to reject keys issued by a different pool.
fn generate_pool_id() -> u64 {
    POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A thread-safe object pool that hands out stable, individually addressable slots for values
/// of type `T`.
///
/// Storage comes from blocks of a fixed number of slots each. When every slot is occupied, the
/// pool adds another block; blocks are never moved, resized or removed until the pool is
/// [cleared][Self::clear] or dropped, so the address of an occupied slot does not change while
/// the slot is held.
///
/// There are two ways to hold a slot:
///
/// * [`allocate()`][1] / [`allocate_with()`][2] return a [`SlotKey`] that you later give back
///   to [`deallocate()`][3]. The value in the slot can be reached via [`with_value()`][4],
///   [`with_value_mut()`][5] or, from unsafe code, via [`slot_ptr()`][6].
/// * [`ScopedHandle`][crate::ScopedHandle] acquires a slot when created, dereferences to the
///   value and releases the slot when dropped. This is the preferred way.
///
/// # Allocation order
///
/// Slots are handed out first-fit: the first vacant slot in the first block that has one,
/// scanning blocks in creation order and slots in index order. Which freed slot a future
/// allocation reuses is not otherwise specified.
///
/// # Thread safety
///
/// All bookkeeping is guarded by a single lock per pool, so the pool can be shared between
/// threads (e.g. via `Arc` or a `static`) when `T` is [`Send`]. The lock is held only for the
/// duration of each call, never while a caller holds a slot.
///
/// # Example
///
/// ```rust
/// use slot_pool::Pool;
///
/// let pool = Pool::<u64>::builder().block_capacity(4).build();
///
/// let key = pool.allocate_with(42).unwrap();
/// assert_eq!(pool.with_value(&key, |value| *value).unwrap(), 42);
///
/// pool.with_value_mut(&key, |value| *value += 1).unwrap();
/// assert_eq!(pool.with_value(&key, |value| *value).unwrap(), 43);
///
/// pool.deallocate(key).unwrap();
/// assert_eq!(pool.stats().allocated(), 0);
/// ```
///
/// [1]: Self::allocate
/// [2]: Self::allocate_with
/// [3]: Self::deallocate
/// [4]: Self::with_value
/// [5]: Self::with_value_mut
/// [6]: Self::slot_ptr
pub struct Pool<T> {
    /// Ensures keys can only be used with the pool that issued them.
    id: u64,

    block_capacity: usize,
    max_blocks: Option<usize>,
    drop_policy: DropPolicy,

    state: Mutex<PoolState<T>>,
}

struct PoolState<T> {
    /// Append-only between clears. We never remove a block that may contain occupied slots
    /// because we promised stable addresses.
    blocks: Vec<Block<T>>,

    /// Sum of occupied slots across all blocks.
    total_allocated: usize,

    /// Advanced by every clear. Keys from an older epoch point into blocks that no longer exist.
    epoch: u64,

    /// Lowest index of any block that has a vacant slot, if known. This being `None` does not
    /// imply that there are no vacant slots, it just means we do not know which block has them.
    /// If `Some`, no block with a lower index has a vacant slot, which keeps allocation first-fit.
    block_with_vacant_slot_index: Option<usize>,
}

impl<T> Pool<T> {
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[must_use]
    pub(crate) fn new_inner(
        block_capacity: usize,
        max_blocks: Option<usize>,
        drop_policy: DropPolicy,
    ) -> Self {
        assert!(size_of::<T>() > 0, "Pool must have non-zero item size");

        Self {
            id: generate_pool_id(),
            block_capacity,
            max_blocks,
            drop_policy,
            state: Mutex::new(PoolState {
                blocks: Vec::new(),
                total_allocated: 0,
                epoch: 0,
                block_with_vacant_slot_index: None,
            }),
        }
    }

    /// Creates a new [`Pool`] with the default configuration.
    ///
    /// The pool starts without any blocks and grows as slots are allocated.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::Pool;
    ///
    /// let pool = Pool::<String>::new();
    ///
    /// assert_eq!(pool.stats().capacity(), 0);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a new [`Pool`].
    ///
    /// Use this when you want to customize the pool configuration beyond the defaults.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::Pool;
    ///
    /// let pool = Pool::<u32>::builder().block_capacity(16).build();
    ///
    /// assert_eq!(pool.block_capacity(), 16);
    /// ```
    pub fn builder() -> PoolBuilder<T> {
        PoolBuilder::new()
    }

    /// Number of slots in each block of this pool.
    #[must_use]
    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    /// The maximum number of blocks the pool may own, if limited.
    #[must_use]
    pub fn max_blocks(&self) -> Option<usize> {
        self.max_blocks
    }

    /// The [drop policy][DropPolicy] this pool was built with.
    #[must_use]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// Acquires a slot, initializes it with `T::default()` and returns its key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] if every slot is occupied and the pool cannot add a block.
    /// The pool remains usable; the call may succeed later once slots are released.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::Pool;
    ///
    /// let pool = Pool::<i32>::new();
    ///
    /// let key = pool.allocate().unwrap();
    /// assert_eq!(pool.with_value(&key, |value| *value).unwrap(), 0);
    /// # pool.deallocate(key).unwrap();
    /// ```
    pub fn allocate(&self) -> Result<SlotKey>
    where
        T: Default,
    {
        self.allocate_with(T::default())
    }

    /// Acquires a slot, moves `value` into it and returns its key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] if every slot is occupied and the pool cannot add a block.
    /// The value is dropped in that case.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::Pool;
    ///
    /// let pool = Pool::<String>::new();
    ///
    /// let key = pool.allocate_with("Hello".to_string()).unwrap();
    /// assert_eq!(pool.with_value(&key, |value| value.len()).unwrap(), 5);
    /// # pool.deallocate(key).unwrap();
    /// ```
    pub fn allocate_with(&self, value: T) -> Result<SlotKey> {
        self.insert(value).map(|(key, _)| key)
    }

    /// Places the value into a vacant slot, returning both the key and the stable address of
    /// the value.
    pub(crate) fn insert(&self, value: T) -> Result<(SlotKey, NonNull<T>)> {
        let mut state = self.state.lock();

        let block_index = match self.index_of_block_with_vacant_slot(&mut state) {
            Ok(index) => index,
            Err(error) => {
                drop(state);

                // The value never made it into the pool. Whatever its drop does, it does not
                // get to do it while we hold the lock.
                drop(value);

                return Err(error);
            }
        };

        let block = state
            .blocks
            .get_mut(block_index)
            .expect("we just located a block with a vacant slot at this index");

        let slot_index = block.occupy(value);
        let is_full = block.is_full();
        let value_ptr = block
            .value_ptr(slot_index)
            .expect("we just occupied this slot");

        if is_full {
            // Cache is now wrong; the next allocation will rescan from the start.
            state.block_with_vacant_slot_index = None;
        }

        state.total_allocated = state
            .total_allocated
            .checked_add(1)
            .expect("a pool cannot hold more slots than virtual memory can fit");

        #[cfg(debug_assertions)]
        self.integrity_check(&state);

        let key = SlotKey {
            pool_id: self.id,
            epoch: state.epoch,
            coordinates: SlotCoordinates::from_parts(block_index, slot_index),
        };

        drop(state);

        trace!(pool_id = self.id, block_index, slot_index, "allocated slot");

        Ok((key, value_ptr))
    }

    /// Releases the slot identified by the key, dropping the value it holds.
    ///
    /// The slot becomes eligible for reuse by a future allocation. Other slots are unaffected
    /// and blocks are never released by this call.
    ///
    /// # Errors
    ///
    /// * [`Error::ForeignKey`] if the key was issued by a different pool.
    /// * [`Error::StaleKey`] if the pool was cleared after the key was issued.
    /// * [`Error::VacantSlot`] if the slot is not occupied.
    ///
    /// A rejected key is consumed. Nothing in this pool changes in that case.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::{Error, Pool};
    ///
    /// let pool = Pool::<u32>::new();
    /// let other = Pool::<u32>::new();
    ///
    /// let key = pool.allocate().unwrap();
    /// assert_eq!(pool.stats().allocated(), 1);
    ///
    /// pool.deallocate(key).unwrap();
    /// assert_eq!(pool.stats().allocated(), 0);
    ///
    /// let foreign = other.allocate().unwrap();
    /// assert_eq!(pool.deallocate(foreign), Err(Error::ForeignKey));
    /// ```
    pub fn deallocate(&self, key: SlotKey) -> Result<()> {
        let value = self.remove(&key).inspect_err(|error| {
            warn!(
                pool_id = self.id,
                item_type = type_name::<T>(),
                %error,
                "rejected slot release"
            );
        })?;

        trace!(
            pool_id = self.id,
            block_index = key.block_index(),
            slot_index = key.slot_index(),
            "released slot"
        );

        // Dropped outside the lock, so a value whose drop touches this pool cannot deadlock.
        drop(value);

        Ok(())
    }

    fn remove(&self, key: &SlotKey) -> Result<T> {
        let mut state = self.state.lock();

        self.check_key(&state, key)?;

        let vacant_slot = || Error::VacantSlot {
            block_index: key.block_index(),
            slot_index: key.slot_index(),
        };

        let value = state
            .blocks
            .get_mut(key.block_index())
            .ok_or_else(vacant_slot)?
            .vacate(key.slot_index())
            .ok_or_else(vacant_slot)?;

        state.total_allocated = state
            .total_allocated
            .checked_sub(1)
            .expect("we just vacated an occupied slot, so the count must be non-zero");

        // There is now a vacant slot in this block. We remember the lowest such block so
        // allocation keeps filling the pool from the start.
        Self::update_vacant_slot_cache(&mut state, key.block_index());

        #[cfg(debug_assertions)]
        self.integrity_check(&state);

        Ok(value)
    }

    /// Calls `f` with a shared reference to the value in the slot, under the pool lock.
    ///
    /// `f` must not call back into this pool; the lock is not re-entrant.
    ///
    /// # Errors
    ///
    /// Fails with the same key validation errors as [`deallocate()`][Self::deallocate].
    pub fn with_value<R>(&self, key: &SlotKey, f: impl FnOnce(&T) -> R) -> Result<R> {
        let state = self.state.lock();

        self.check_key(&state, key)?;

        let value = state
            .blocks
            .get(key.block_index())
            .and_then(|block| block.value(key.slot_index()))
            .ok_or(Error::VacantSlot {
                block_index: key.block_index(),
                slot_index: key.slot_index(),
            })?;

        Ok(f(value))
    }

    /// Calls `f` with an exclusive reference to the value in the slot, under the pool lock.
    ///
    /// `f` must not call back into this pool; the lock is not re-entrant.
    ///
    /// # Errors
    ///
    /// Fails with the same key validation errors as [`deallocate()`][Self::deallocate].
    pub fn with_value_mut<R>(&self, key: &SlotKey, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut state = self.state.lock();

        self.check_key(&state, key)?;

        let value = state
            .blocks
            .get_mut(key.block_index())
            .and_then(|block| block.value_mut(key.slot_index()))
            .ok_or(Error::VacantSlot {
                block_index: key.block_index(),
                slot_index: key.slot_index(),
            })?;

        Ok(f(value))
    }

    /// The stable address of the value in the slot.
    ///
    /// The pointer remains valid until the slot is released, the pool is cleared or the pool is
    /// dropped. The pool never creates references to the value on its own except through
    /// [`with_value()`][Self::with_value] and [`with_value_mut()`][Self::with_value_mut], so
    /// unsafe code that owns the key may access the value through the pointer as long as it
    /// does not call those two methods concurrently.
    ///
    /// # Errors
    ///
    /// Fails with the same key validation errors as [`deallocate()`][Self::deallocate].
    pub fn slot_ptr(&self, key: &SlotKey) -> Result<NonNull<T>> {
        let state = self.state.lock();

        self.check_key(&state, key)?;

        state
            .blocks
            .get(key.block_index())
            .and_then(|block| block.value_ptr(key.slot_index()))
            .ok_or(Error::VacantSlot {
                block_index: key.block_index(),
                slot_index: key.slot_index(),
            })
    }

    /// Whether the address lies within the storage of any block of this pool.
    ///
    /// This is an ownership lookup by address range; it does not tell whether the slot at that
    /// address is occupied.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::Pool;
    ///
    /// let pool = Pool::<u64>::new();
    /// let key = pool.allocate().unwrap();
    ///
    /// let ptr = pool.slot_ptr(&key).unwrap();
    /// assert!(pool.contains_address(ptr.as_ptr()));
    ///
    /// let elsewhere = 0_u64;
    /// assert!(!pool.contains_address(&raw const elsewhere));
    /// # pool.deallocate(key).unwrap();
    /// ```
    #[must_use]
    pub fn contains_address(&self, ptr: *const T) -> bool {
        self.state
            .lock()
            .blocks
            .iter()
            .any(|block| block.contains_address(ptr))
    }

    /// Takes a snapshot of the pool's occupancy.
    ///
    /// The snapshot is advisory; other threads may change the pool as soon as it is taken.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();

        PoolStats::new(
            state.total_allocated,
            self.capacity_of(&state),
            state.blocks.len(),
        )
    }

    /// The number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().total_allocated
    }

    /// The number of slots the pool can hand out without adding a block, including occupied ones.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity_of(&self.state.lock())
    }

    /// Whether no slot is occupied.
    ///
    /// An empty pool may still be holding blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds blocks until at least `additional` more slots can be allocated without growth.
    ///
    /// Does nothing if there is already enough vacant capacity. Capacity is never reduced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] if the pool cannot add all the blocks required. Blocks added
    /// before the failure are kept.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::Pool;
    ///
    /// let pool = Pool::<u32>::builder().block_capacity(8).build();
    ///
    /// pool.reserve(10).unwrap();
    /// assert_eq!(pool.capacity(), 16);
    /// ```
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn reserve(&self, additional: usize) -> Result<()> {
        let mut state = self.state.lock();

        let required_capacity = state
            .total_allocated
            .checked_add(additional)
            .expect("capacity overflow: requested capacity exceeds maximum possible value");

        let required_blocks = required_capacity.div_ceil(self.block_capacity);
        let blocks_before = state.blocks.len();

        while state.blocks.len() < required_blocks {
            self.add_block(&mut state)?;
        }

        if state.blocks.len() > blocks_before {
            debug!(
                pool_id = self.id,
                blocks_before,
                blocks_after = state.blocks.len(),
                "reserved pool capacity"
            );
        }

        Ok(())
    }

    /// Drops every block, and with them every value still held in a slot.
    ///
    /// Afterwards the pool has no blocks and no capacity. Keys issued before the call are stale
    /// and rejected by every method that takes a key.
    ///
    /// This takes `&mut self`, so no [`ScopedHandle`][crate::ScopedHandle] can be alive while
    /// the pool is cleared.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::{Error, Pool};
    ///
    /// let mut pool = Pool::<u32>::new();
    /// let key = pool.allocate().unwrap();
    ///
    /// pool.clear();
    /// assert_eq!(pool.stats().capacity(), 0);
    ///
    /// assert!(matches!(pool.deallocate(key), Err(Error::StaleKey { .. })));
    /// ```
    pub fn clear(&mut self) {
        let state = self.state.get_mut();

        let blocks = mem::take(&mut state.blocks);
        let dropped_values = mem::take(&mut state.total_allocated);
        state.block_with_vacant_slot_index = None;
        state.epoch = state
            .epoch
            .checked_add(1)
            .expect("a pool cannot be cleared 2^64 times in any realistic lifetime");

        debug!(
            pool_id = self.id,
            epoch = state.epoch,
            dropped_blocks = blocks.len(),
            dropped_values,
            "cleared pool"
        );

        drop(blocks);
    }

    fn check_key(&self, state: &PoolState<T>, key: &SlotKey) -> Result<()> {
        if key.pool_id != self.id {
            return Err(Error::ForeignKey);
        }

        if key.epoch != state.epoch {
            return Err(Error::StaleKey {
                key_epoch: key.epoch,
                pool_epoch: state.epoch,
            });
        }

        Ok(())
    }

    fn capacity_of(&self, state: &PoolState<T>) -> usize {
        state
            .blocks
            .len()
            .checked_mul(self.block_capacity)
            .expect("overflow here would mean the pool can hold more items than virtual memory can fit, which makes no sense - it would never grow that big")
    }

    fn index_of_block_with_vacant_slot(&self, state: &mut PoolState<T>) -> Result<usize> {
        if let Some(index) = state.block_with_vacant_slot_index {
            // If we have this cached, we return it immediately.
            // This is a performance optimization to avoid scanning the entire collection.
            return Ok(index);
        }

        // We look up the first block with some free space, filling the pool from the start.
        let index = if let Some(index) = state.blocks.iter().position(|block| !block.is_full()) {
            index
        } else {
            // All blocks are full, so we need to expand capacity.
            self.add_block(state)?
        };

        // We update the cache. The caller is responsible for invalidating this when needed.
        state.block_with_vacant_slot_index = Some(index);
        Ok(index)
    }

    /// Appends a new block and returns its index.
    fn add_block(&self, state: &mut PoolState<T>) -> Result<usize> {
        let blocks = state.blocks.len();

        let exhausted = || {
            warn!(
                pool_id = self.id,
                item_type = type_name::<T>(),
                blocks,
                block_capacity = self.block_capacity,
                "pool exhausted"
            );

            Error::Exhausted {
                blocks,
                block_capacity: self.block_capacity,
            }
        };

        if self.max_blocks.is_some_and(|max_blocks| blocks >= max_blocks) {
            return Err(exhausted());
        }

        let block = Block::try_new(self.block_capacity).ok_or_else(exhausted)?;
        state.blocks.push(block);

        debug!(
            pool_id = self.id,
            item_type = type_name::<T>(),
            block_index = blocks,
            block_capacity = self.block_capacity,
            "added block to pool"
        );

        Ok(blocks)
    }

    /// Updates the vacant slot cache after a slot became vacant in the given block.
    ///
    /// The cache is only lowered from a known value. An unknown (`None`) cache stays unknown
    /// because blocks between the cleared one and the start may also have vacancies, and the
    /// next allocation rescans from the start anyway.
    fn update_vacant_slot_cache(state: &mut PoolState<T>, block_with_vacant_slot_index: usize) {
        if state
            .block_with_vacant_slot_index
            .is_some_and(|current| current > block_with_vacant_slot_index)
        {
            state.block_with_vacant_slot_index = Some(block_with_vacant_slot_index);
        }
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    fn integrity_check(&self, state: &PoolState<T>) {
        let mut observed_allocated: usize = 0;

        for block in &state.blocks {
            block.integrity_check();

            observed_allocated = observed_allocated
                .checked_add(block.len())
                .expect("a pool cannot hold more slots than virtual memory can fit");
        }

        assert!(
            state.total_allocated == observed_allocated,
            "total_allocated {} does not match the observed occupied count {} in pool of {}",
            state.total_allocated,
            observed_allocated,
            type_name::<T>()
        );

        if let Some(cached) = state.block_with_vacant_slot_index {
            let first_vacant = state.blocks.iter().position(|block| !block.is_full());

            assert!(
                first_vacant == Some(cached),
                "vacant slot cache points at block {cached} but the first block with a vacant slot is {first_vacant:?} in pool of {}",
                type_name::<T>()
            );
        }
    }
}

impl<T> Default for Pool<T> {
    /// Creates a new [`Pool`] with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();

        f.debug_struct("Pool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("id", &self.id)
            .field("block_capacity", &self.block_capacity)
            .field("max_blocks", &self.max_blocks)
            .field("drop_policy", &self.drop_policy)
            .field("stats", &stats)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let was_empty = state.total_allocated == 0;

        // We clean up the memory first, then complain. As we are going to panic anyway if
        // something is wrong, there is little good to expect for the app itself.
        state.blocks.clear();

        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                was_empty,
                "dropped a non-empty pool of {} with a policy that says it must be empty when dropped",
                type_name::<T>()
            );
        }
    }
}
