use thiserror::Error;

/// Errors that can occur when acquiring, releasing or accessing pool slots.
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The pool has no vacant slot and could not add another block, either because the
    /// memory allocator refused the request or because the configured block limit was reached.
    ///
    /// The pool remains fully usable; slots released later can satisfy new requests.
    #[error("pool exhausted: could not add a block of {block_capacity} slots to the existing {blocks} blocks")]
    Exhausted {
        /// Number of blocks the pool owned when growth failed.
        blocks: usize,

        /// Number of slots in each block of the pool.
        block_capacity: usize,
    },

    /// The key was issued by a different pool.
    #[error("slot key was issued by a different pool")]
    ForeignKey,

    /// The key was issued before the pool was cleared, so its slot no longer exists.
    #[error("slot key from epoch {key_epoch} is stale, the pool is at epoch {pool_epoch}")]
    StaleKey {
        /// The pool epoch at the time the key was issued.
        key_epoch: u64,

        /// The current pool epoch.
        pool_epoch: u64,
    },

    /// The key points at a slot that does not hold a value.
    #[error("slot {slot_index} in block {block_index} is not occupied")]
    VacantSlot {
        /// Index of the block the key points into.
        block_index: usize,

        /// Index of the slot within that block.
        slot_index: usize,
    },

    /// A scoped handle was accessed although it does not hold a slot.
    #[error("scoped handle does not hold a slot")]
    EmptyHandle,
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
