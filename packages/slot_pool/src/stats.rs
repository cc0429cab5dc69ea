use std::fmt;

/// A point-in-time snapshot of pool occupancy, obtained from [`Pool::stats()`][crate::Pool::stats].
///
/// The snapshot is advisory: other threads may allocate or release slots as soon as it is
/// taken, so do not use it to make decisions that need to be transactional.
///
/// # Example
///
/// ```rust
/// use slot_pool::Pool;
///
/// let pool = Pool::<f64>::builder().block_capacity(4).build();
/// let key = pool.allocate().unwrap();
///
/// let stats = pool.stats();
/// assert_eq!(stats.allocated(), 1);
/// assert_eq!(stats.capacity(), 4);
/// assert_eq!(stats.to_string(), "1/4 slots allocated");
///
/// let (allocated, capacity): (usize, usize) = stats.into();
/// assert_eq!((allocated, capacity), (1, 4));
/// # pool.deallocate(key).unwrap();
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolStats {
    allocated: usize,
    capacity: usize,
    blocks: usize,
}

impl PoolStats {
    #[must_use]
    pub(crate) fn new(allocated: usize, capacity: usize, blocks: usize) -> Self {
        Self {
            allocated,
            capacity,
            blocks,
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Total number of slots across all blocks, occupied or not.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks the pool owns.
    #[must_use]
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Number of slots that can be handed out without adding a block.
    #[must_use]
    pub fn vacant(&self) -> usize {
        self.capacity
            .checked_sub(self.allocated)
            .expect("a pool never has more occupied slots than it has slots")
    }
}

impl From<PoolStats> for (usize, usize) {
    /// The `(allocated, capacity)` pair.
    fn from(stats: PoolStats) -> Self {
        (stats.allocated, stats.capacity)
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} slots allocated", self.allocated, self.capacity)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn vacant_is_capacity_minus_allocated() {
        let stats = PoolStats::new(3, 8, 2);

        assert_eq!(stats.vacant(), 5);
        assert_eq!(stats.blocks(), 2);
    }

    #[test]
    fn converts_to_pair() {
        let pair: (usize, usize) = PoolStats::new(5, 8, 2).into();

        assert_eq!(pair, (5, 8));
    }

    #[test]
    fn display_shows_ratio() {
        assert_eq!(PoolStats::new(0, 0, 0).to_string(), "0/0 slots allocated");
        assert_eq!(PoolStats::new(5, 8, 2).to_string(), "5/8 slots allocated");
    }
}
