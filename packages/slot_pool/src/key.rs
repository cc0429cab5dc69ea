/// Position of a slot within a pool: which block, and which slot within that block.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SlotCoordinates {
    block_index: usize,
    slot_index: usize,
}

impl SlotCoordinates {
    #[must_use]
    pub(crate) fn from_parts(block_index: usize, slot_index: usize) -> Self {
        Self {
            block_index,
            slot_index,
        }
    }

    /// Index of the block containing the slot. Blocks are numbered in creation order.
    #[must_use]
    pub fn block_index(&self) -> usize {
        self.block_index
    }

    /// Index of the slot within its block.
    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.slot_index
    }
}

/// Proof of ownership of one occupied slot in a [`Pool`][crate::Pool].
///
/// Returned by [`Pool::allocate()`][crate::Pool::allocate] and given back to
/// [`Pool::deallocate()`][crate::Pool::deallocate] to release the slot. The key is neither
/// [`Copy`] nor [`Clone`], so each occupied slot has exactly one key and releasing consumes it;
/// a double release cannot be written.
///
/// A key remembers which pool issued it and in which epoch (the pool's epoch advances on every
/// [`clear()`][crate::Pool::clear]), so a key handed to the wrong pool, or used after the pool
/// was cleared, is rejected with an error instead of touching an unrelated slot.
///
/// Dropping a key without releasing it leaves the slot occupied until the pool is cleared or
/// dropped.
///
/// # Example
///
/// ```rust
/// use slot_pool::Pool;
///
/// let pool = Pool::<u32>::builder().block_capacity(8).build();
///
/// let key = pool.allocate_with(7).unwrap();
/// assert_eq!(key.block_index(), 0);
/// assert_eq!(key.slot_index(), 0);
///
/// pool.deallocate(key).unwrap();
/// ```
#[derive(Debug, Eq, PartialEq)]
#[must_use = "dropping a slot key leaves its slot occupied until the pool is cleared"]
pub struct SlotKey {
    pub(crate) pool_id: u64,
    pub(crate) epoch: u64,
    pub(crate) coordinates: SlotCoordinates,
}

impl SlotKey {
    /// Where in the pool the slot lives.
    #[must_use]
    pub fn coordinates(&self) -> SlotCoordinates {
        self.coordinates
    }

    /// Index of the block containing the slot.
    #[must_use]
    pub fn block_index(&self) -> usize {
        self.coordinates.block_index()
    }

    /// Index of the slot within its block.
    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.coordinates.slot_index()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(SlotKey: Send, Sync);
    assert_not_impl_any!(SlotKey: Clone, Copy);
    assert_impl_all!(SlotCoordinates: Copy, Send, Sync);

    #[test]
    fn accessors_expose_coordinates() {
        let key = SlotKey {
            pool_id: 1,
            epoch: 0,
            coordinates: SlotCoordinates::from_parts(3, 17),
        };

        assert_eq!(key.block_index(), 3);
        assert_eq!(key.slot_index(), 17);
        assert_eq!(key.coordinates(), SlotCoordinates::from_parts(3, 17));
    }
}
