use std::alloc::{Layout, alloc, dealloc};
use std::any::type_name;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

/// Backing storage of a [`Pool`][crate::Pool]: a fixed-capacity, heap-allocated run of slots.
///
/// The storage is allocated once when the block is created and released when the block is
/// dropped. It is never resized or moved in between, which is what keeps the address of every
/// slot stable for as long as the block exists.
///
/// Every slot is either vacant or occupied by a value. Slots are searched first-fit, in index
/// order. The block does not hand out references on its own; the owning pool decides who may
/// access which slot.
///
/// Occupancy is tracked in a separate mask, never in the slot memory itself. Searching for a
/// vacant slot therefore does not read any value, which may be in use by its owner at the time.
#[derive(Debug)]
pub(crate) struct Block<T> {
    first_slot_ptr: NonNull<MaybeUninit<T>>,

    /// One flag per slot. A slot's value is initialized if and only if its flag is set.
    occupied: Box<[bool]>,

    /// Number of vacant slots. Always the number of `false` flags in `occupied`.
    free_count: usize,
}

impl<T> Block<T> {
    /// Creates a block with `capacity` vacant slots.
    ///
    /// Returns `None` if the memory allocator cannot provide the storage.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is zero or `T` is zero-sized.
    #[must_use]
    pub(crate) fn try_new(capacity: usize) -> Option<Self> {
        assert!(
            capacity > 0,
            "Block of {} must have non-zero capacity",
            type_name::<T>()
        );
        assert!(size_of::<T>() > 0, "Block must have non-zero item size");

        // A layout that does not fit in the address space is no different from the allocator
        // refusing the request - either way there is no memory for this block.
        let layout = Layout::array::<T>(capacity).ok()?;

        // SAFETY: The layout is non-zero-sized because both the capacity and the item size
        // are non-zero, which we asserted above.
        let ptr = NonNull::new(unsafe { alloc(layout) }.cast::<MaybeUninit<T>>())?;

        let mut occupied = Vec::new();

        if occupied.try_reserve_exact(capacity).is_err() {
            // SAFETY: We allocated this with the same layout just above and nothing else has
            // seen the pointer.
            unsafe {
                dealloc(ptr.as_ptr().cast(), layout);
            }

            return None;
        }

        occupied.resize(capacity, false);

        Some(Self {
            first_slot_ptr: ptr,
            occupied: occupied.into_boxed_slice(),
            free_count: capacity,
        })
    }

    fn capacity(&self) -> usize {
        self.occupied.len()
    }

    fn layout(&self) -> Layout {
        Layout::array::<T>(self.capacity())
            .expect("layout was calculable when the block was created with the same capacity")
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn free_count(&self) -> usize {
        self.free_count
    }

    /// Number of occupied slots.
    #[cfg(any(test, debug_assertions))]
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.capacity()
            .checked_sub(self.free_count)
            .expect("free count can never exceed capacity")
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.free_count == 0
    }

    fn is_occupied(&self, index: usize) -> bool {
        self.occupied.get(index).copied().unwrap_or(false)
    }

    /// Pointer to the slot at `index`, which must be within capacity.
    fn slot_ptr(&self, index: usize) -> NonNull<MaybeUninit<T>> {
        assert!(
            index < self.capacity(),
            "slot index {index} out of bounds in block of {}",
            type_name::<T>()
        );

        // SAFETY: Guarded by the bounds check above, so the pointer stays within the allocation.
        unsafe { self.first_slot_ptr.add(index) }
    }

    /// Places the value in the first vacant slot and returns the index of that slot.
    ///
    /// # Panics
    ///
    /// Panics if the block is full.
    pub(crate) fn occupy(&mut self, value: T) -> usize {
        assert!(
            !self.is_full(),
            "cannot occupy a slot in a full block of {}",
            type_name::<T>()
        );

        let index = self
            .occupied
            .iter()
            .position(|occupied| !occupied)
            .expect("free count says there is a vacant slot, so the scan must find one");

        // SAFETY: The slot is in bounds and vacant, so nobody holds a pointer into it and there
        // is no old value we would be overwriting without dropping.
        unsafe {
            self.slot_ptr(index).as_ptr().write(MaybeUninit::new(value));
        }

        *self
            .occupied
            .get_mut(index)
            .expect("index was produced by a scan of the occupancy mask") = true;

        self.free_count = self
            .free_count
            .checked_sub(1)
            .expect("we asserted above that the block is not full");

        index
    }

    /// Marks the slot vacant and hands back the value it held.
    ///
    /// Returns `None` without touching anything if the index is out of bounds or the slot is
    /// already vacant.
    pub(crate) fn vacate(&mut self, index: usize) -> Option<T> {
        if !self.is_occupied(index) {
            return None;
        }

        // SAFETY: The slot is occupied, so its value is initialized. We clear the flag right
        // after, so the value is never read again from the slot.
        let value = unsafe { self.slot_ptr(index).as_ptr().read().assume_init() };

        *self
            .occupied
            .get_mut(index)
            .expect("occupied slot index is in bounds") = false;

        self.free_count = self
            .free_count
            .checked_add(1)
            .expect("an occupied slot existed, so free count is below capacity");

        Some(value)
    }

    /// The stable address of the value in an occupied slot.
    #[must_use]
    pub(crate) fn value_ptr(&self, index: usize) -> Option<NonNull<T>> {
        self.is_occupied(index)
            .then(|| self.slot_ptr(index).cast())
    }

    #[must_use]
    pub(crate) fn value(&self, index: usize) -> Option<&T> {
        let ptr = self.value_ptr(index)?;

        // SAFETY: The slot is occupied, so the value is initialized. The pool only calls this
        // for slots owned by a key the caller presented, so no exclusive reference exists.
        Some(unsafe { ptr.as_ref() })
    }

    #[must_use]
    pub(crate) fn value_mut(&mut self, index: usize) -> Option<&mut T> {
        let mut ptr = self.value_ptr(index)?;

        // SAFETY: The slot is occupied, so the value is initialized. We hold `&mut self` and
        // the pool only calls this for slots owned by a key the caller presented.
        Some(unsafe { ptr.as_mut() })
    }

    /// Whether the address lies within the storage of this block.
    #[must_use]
    pub(crate) fn contains_address(&self, ptr: *const T) -> bool {
        let start = self.first_slot_ptr.as_ptr().addr();
        let end = start
            .checked_add(self.layout().size())
            .expect("an allocation cannot extend beyond the end of the address space");

        (start..end).contains(&ptr.addr())
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let observed_vacant = self.occupied.iter().filter(|occupied| !**occupied).count();

        assert!(
            self.free_count == observed_vacant,
            "self.free_count {} does not match the observed vacant count {} in block of {}",
            self.free_count,
            observed_vacant,
            type_name::<T>()
        );
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        for index in 0..self.capacity() {
            if self.is_occupied(index) {
                // SAFETY: The slot is occupied, so the value is initialized. The block is going
                // away, so nothing can observe the slot after this.
                unsafe {
                    self.slot_ptr(index).cast::<T>().drop_in_place();
                }
            }
        }

        // SAFETY: The layout must match between alloc and dealloc. It does.
        unsafe {
            dealloc(self.first_slot_ptr.as_ptr().cast(), self.layout());
        }
    }
}

// SAFETY: Yes, there are raw pointers involved here but nothing inherently non-thread-mobile
// about it, so as long as T itself can move between threads, the block can do so, too.
unsafe impl<T: Send> Send for Block<T> {}
