/// Determines what happens to occupied slots when a [`Pool`][crate::Pool] is dropped.
///
/// By default, the pool drops the values in any slots that are still occupied.
///
/// # Examples
///
/// ```
/// use slot_pool::{DropPolicy, Pool};
///
/// // The drop policy is set at pool creation time.
/// let pool = Pool::<u32>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Values still occupying slots are dropped together with the pool. This is the default.
    #[default]
    MayDropItems,

    /// The pool will panic if any slot is still occupied when the pool is dropped.
    ///
    /// Useful when every slot is expected to be released through its key or handle before
    /// teardown, so that a leaked slot shows up as a loud failure instead of a silent drop.
    MustNotDropItems,
}
