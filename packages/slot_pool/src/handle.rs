use std::any::type_name;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::{Error, Pool, Registered, Result, SlotCoordinates, SlotKey};

/// Exclusive, scoped ownership of one slot in a [`Pool`].
///
/// Creating a handle immediately acquires a slot from the pool. Dropping the handle releases
/// the slot again, exactly once, whichever way the owning scope is exited (normal return,
/// early return via `?` or a panic unwinding through it).
///
/// If the pool was exhausted when the handle was created, the handle is empty. Check with
/// [`is_valid()`][1] or use the guarded accessors [`get()`][2] and [`get_mut()`][3], which
/// return [`Error::EmptyHandle`] instead of a value. Dereferencing an empty handle through
/// [`Deref`] or [`DerefMut`] panics.
///
/// The handle is move-only: moving it transfers the slot and the moved-from binding can no
/// longer be used, so there is no second release. Assigning a new handle over an existing one
/// drops the old handle first, releasing its slot.
///
/// Holding a handle does not hold the pool lock; other threads can use the same pool freely.
///
/// # Example
///
/// ```rust
/// use slot_pool::{Pool, ScopedHandle};
///
/// let pool = Pool::<String>::new();
///
/// {
///     let mut greeting = ScopedHandle::with_value(&pool, "Hello".to_string());
///     assert!(greeting.is_valid());
///
///     greeting.push_str(", World!");
///     assert_eq!(*greeting, "Hello, World!");
///
///     assert_eq!(pool.stats().allocated(), 1);
/// }
///
/// // The slot was released when the handle went out of scope.
/// assert_eq!(pool.stats().allocated(), 0);
/// ```
///
/// [1]: Self::is_valid
/// [2]: Self::get
/// [3]: Self::get_mut
pub struct ScopedHandle<'p, T> {
    pool: &'p Pool<T>,

    slot: Option<HeldSlot<T>>,
}

struct HeldSlot<T> {
    key: SlotKey,

    /// Stable address of the value. Valid for as long as we hold the key, because the pool can
    /// only be cleared or dropped once nothing borrows it anymore.
    value_ptr: NonNull<T>,
}

impl<'p, T> ScopedHandle<'p, T> {
    /// Acquires a slot from the pool and initializes it with `T::default()`.
    ///
    /// The handle is empty if the pool is exhausted.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::{Pool, ScopedHandle};
    ///
    /// let pool = Pool::<u64>::new();
    ///
    /// let mut counter = ScopedHandle::new(&pool);
    /// *counter += 5;
    ///
    /// assert_eq!(*counter, 5);
    /// ```
    #[must_use]
    pub fn new(pool: &'p Pool<T>) -> Self
    where
        T: Default,
    {
        Self::with_value(pool, T::default())
    }

    /// Acquires a slot from the pool and moves `value` into it.
    ///
    /// The handle is empty if the pool is exhausted, in which case the value is dropped.
    #[must_use]
    pub fn with_value(pool: &'p Pool<T>, value: T) -> Self {
        // The pool logs exhaustion; all we need to remember is that we did not get a slot.
        let slot = pool
            .insert(value)
            .ok()
            .map(|(key, value_ptr)| HeldSlot { key, value_ptr });

        Self { pool, slot }
    }

    /// Whether the handle holds a slot.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.slot.is_some()
    }

    /// The pool the handle belongs to.
    #[must_use]
    pub fn pool(&self) -> &'p Pool<T> {
        self.pool
    }

    /// Where in the pool the held slot lives, if the handle holds one.
    #[must_use]
    pub fn coordinates(&self) -> Option<SlotCoordinates> {
        self.slot.as_ref().map(|slot| slot.key.coordinates())
    }

    /// A shared reference to the value in the held slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyHandle`] if the handle does not hold a slot.
    pub fn get(&self) -> Result<&T> {
        let slot = self.slot.as_ref().ok_or(Error::EmptyHandle)?;

        // SAFETY: We exclusively own the slot through its key, which never leaves this handle
        // while the handle uses it. The pool cannot drop the block while we borrow the pool.
        Ok(unsafe { slot.value_ptr.as_ref() })
    }

    /// An exclusive reference to the value in the held slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyHandle`] if the handle does not hold a slot.
    pub fn get_mut(&mut self) -> Result<&mut T> {
        let slot = self.slot.as_mut().ok_or(Error::EmptyHandle)?;

        // SAFETY: As in `get()`, and `&mut self` ensures no other reference to the value
        // exists through this handle.
        Ok(unsafe { slot.value_ptr.as_mut() })
    }

    /// Releases the held slot now instead of when the handle is dropped.
    ///
    /// Afterwards the handle is empty. Does nothing if the handle is already empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::{Pool, ScopedHandle};
    ///
    /// let pool = Pool::<u32>::new();
    /// let mut handle = ScopedHandle::new(&pool);
    ///
    /// handle.release();
    ///
    /// assert!(!handle.is_valid());
    /// assert_eq!(pool.stats().allocated(), 0);
    /// ```
    pub fn release(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool
                .deallocate(slot.key)
                .expect("a handle's key stays valid while the handle borrows the pool");
        }
    }

    /// Detaches the slot from the handle and returns its key.
    ///
    /// The slot stays occupied and the caller becomes responsible for releasing it via
    /// [`Pool::deallocate()`]. Returns `None` if the handle is empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::{Pool, ScopedHandle};
    ///
    /// let pool = Pool::<u32>::new();
    ///
    /// let key = ScopedHandle::with_value(&pool, 9).into_key().unwrap();
    /// assert_eq!(pool.with_value(&key, |value| *value).unwrap(), 9);
    ///
    /// pool.deallocate(key).unwrap();
    /// ```
    #[must_use]
    pub fn into_key(mut self) -> Option<SlotKey> {
        self.slot.take().map(|slot| slot.key)
    }
}

impl<T> ScopedHandle<'static, T>
where
    T: Registered + Default,
{
    /// Acquires a slot from the process-wide pool registered for `T`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slot_pool::ScopedHandle;
    ///
    /// let mut value = ScopedHandle::<f64>::global();
    /// *value = 2.5;
    ///
    /// assert!(value.is_valid());
    /// ```
    #[must_use]
    pub fn global() -> Self {
        Self::new(T::global_pool())
    }
}

impl<T> Deref for ScopedHandle<'_, T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle does not hold a slot.
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Ok(value) => value,
            Err(error) => panic!(
                "cannot dereference scoped handle of {}: {error}",
                type_name::<T>()
            ),
        }
    }
}

impl<T> DerefMut for ScopedHandle<'_, T> {
    /// # Panics
    ///
    /// Panics if the handle does not hold a slot.
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.get_mut() {
            Ok(value) => value,
            Err(error) => panic!(
                "cannot dereference scoped handle of {}: {error}",
                type_name::<T>()
            ),
        }
    }
}

impl<T> Drop for ScopedHandle<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> fmt::Debug for ScopedHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedHandle")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("coordinates", &self.coordinates())
            .finish_non_exhaustive()
    }
}

// SAFETY: The handle owns its slot exclusively. Moving it to another thread moves access to the
// value (and the eventual drop of the value) there, which is fine as long as T can move between
// threads. The pool reference requires `Pool<T>: Sync`, which also only requires `T: Send`.
unsafe impl<T: Send> Send for ScopedHandle<'_, T> {}

// SAFETY: Sharing the handle only gives out `&T` and `&Pool<T>`, which is fine when T is Sync
// (for the value) and Send (for the pool).
unsafe impl<T: Send + Sync> Sync for ScopedHandle<'_, T> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::thread;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(ScopedHandle<'static, u32>: Send, Sync);
    assert_not_impl_any!(ScopedHandle<'static, u32>: Clone, Copy);
    assert_not_impl_any!(ScopedHandle<'static, Cell<u32>>: Sync);
    assert_not_impl_any!(ScopedHandle<'static, Rc<u32>>: Send, Sync);

    fn exhausted_pool() -> Pool<u32> {
        Pool::builder().block_capacity(1).max_blocks(0).build()
    }

    #[test]
    fn acquires_on_new_and_releases_on_drop() {
        let pool = Pool::<u32>::builder().block_capacity(4).build();

        {
            let handle = ScopedHandle::new(&pool);
            assert!(handle.is_valid());
            assert_eq!(*handle, 0);
            assert_eq!(pool.stats().allocated(), 1);
        }

        assert_eq!(pool.stats().allocated(), 0);
    }

    #[test]
    fn repeated_scopes_do_not_leak() {
        let pool = Pool::<u64>::builder().block_capacity(4).build();

        // Warm up so the capacity is settled before we measure.
        drop(ScopedHandle::new(&pool));
        let capacity_before = pool.stats().capacity();

        for _ in 0..1000 {
            let handle = ScopedHandle::new(&pool);
            assert!(handle.is_valid());
        }

        assert_eq!(pool.stats().allocated(), 0);
        assert_eq!(pool.stats().capacity(), capacity_before);
    }

    #[test]
    fn move_transfers_ownership() {
        let pool = Pool::<u32>::new();

        let first = ScopedHandle::with_value(&pool, 5);
        let coordinates = first.coordinates();

        let second = first;
        assert_eq!(second.coordinates(), coordinates);
        assert_eq!(pool.stats().allocated(), 1);

        drop(second);
        assert_eq!(pool.stats().allocated(), 0);
    }

    #[test]
    fn assigning_over_held_slot_releases_old_slot() {
        let pool = Pool::<u32>::builder().block_capacity(4).build();

        let mut target = ScopedHandle::with_value(&pool, 1);
        let source = ScopedHandle::with_value(&pool, 2);
        assert_eq!(pool.stats().allocated(), 2);
        assert_eq!(*target, 1);

        target = source;

        assert_eq!(pool.stats().allocated(), 1);
        assert_eq!(*target, 2);
    }

    #[test]
    fn empty_handle_reports_error() {
        let pool = exhausted_pool();

        let mut handle = ScopedHandle::new(&pool);

        assert!(!handle.is_valid());
        assert_eq!(handle.get(), Err(Error::EmptyHandle));
        assert_eq!(handle.get_mut(), Err(Error::EmptyHandle));
        assert_eq!(handle.coordinates(), None);

        // Dropping an empty handle does nothing.
        drop(handle);
        assert_eq!(pool.stats().allocated(), 0);
    }

    #[test]
    #[should_panic]
    fn deref_empty_handle_panics() {
        let pool = exhausted_pool();
        let handle = ScopedHandle::new(&pool);

        let _value = *handle;
    }

    #[test]
    #[should_panic]
    fn deref_mut_empty_handle_panics() {
        let pool = exhausted_pool();
        let mut handle = ScopedHandle::new(&pool);

        *handle = 5;
    }

    #[test]
    fn release_is_idempotent() {
        let pool = Pool::<u32>::new();
        let mut handle = ScopedHandle::new(&pool);

        handle.release();
        handle.release();

        assert!(!handle.is_valid());
        assert_eq!(pool.stats().allocated(), 0);
    }

    #[test]
    fn into_key_detaches_slot() {
        let pool = Pool::<u32>::new();

        let key = ScopedHandle::with_value(&pool, 3).into_key().unwrap();
        assert_eq!(pool.stats().allocated(), 1);

        pool.deallocate(key).unwrap();
        assert_eq!(pool.stats().allocated(), 0);

        assert!(ScopedHandle::new(&exhausted_pool()).into_key().is_none());
    }

    #[test]
    fn releases_on_unwind() {
        let pool = Pool::<u32>::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _handle = ScopedHandle::new(&pool);
            panic!("intentional panic while holding a slot");
        }));

        assert!(result.is_err());
        assert_eq!(pool.stats().allocated(), 0);
    }

    #[test]
    fn early_return_releases() {
        fn sum_both(pool: &Pool<u32>, exhausted: &Pool<u32>) -> Result<u32> {
            let first = ScopedHandle::with_value(pool, 1);
            let second = ScopedHandle::with_value(exhausted, 2);

            Ok(*first.get()? + *second.get()?)
        }

        let pool = Pool::<u32>::new();

        assert_eq!(
            sum_both(&pool, &exhausted_pool()),
            Err(Error::EmptyHandle)
        );
        assert_eq!(pool.stats().allocated(), 0);
    }

    #[test]
    fn drops_value_on_release() {
        struct Droppable {
            dropped: Rc<Cell<bool>>,
        }

        impl Drop for Droppable {
            fn drop(&mut self) {
                self.dropped.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));
        let pool = Pool::<Droppable>::new();

        let handle = ScopedHandle::with_value(
            &pool,
            Droppable {
                dropped: Rc::clone(&dropped),
            },
        );
        assert!(!dropped.get());

        drop(handle);
        assert!(dropped.get());
    }

    #[test]
    fn handle_moves_between_threads() {
        let pool = Pool::<String>::new();

        thread::scope(|s| {
            let mut handle = ScopedHandle::with_value(&pool, "from main".to_string());

            s.spawn(move || {
                handle.push_str(" and worker");
                assert_eq!(*handle, "from main and worker");
            });
        });

        assert_eq!(pool.stats().allocated(), 0);
    }

    #[test]
    fn debug_shows_coordinates() {
        let pool = Pool::<u8>::new();
        let handle = ScopedHandle::new(&pool);

        let debug = format!("{handle:?}");
        assert!(debug.contains("block_index: 0"));
        assert!(debug.contains("u8"));
    }
}
