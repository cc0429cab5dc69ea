use std::sync::LazyLock;

use crate::Pool;

/// Block capacity of the process-wide byte pool. Bytes are small and typically requested in
/// bulk, so this pool uses larger blocks than the others.
const BYTE_BLOCK_CAPACITY: usize = 4096;

/// Block capacity of the process-wide numeric pools.
const NUMERIC_BLOCK_CAPACITY: usize = 1024;

/// A type with a process-wide [`Pool`], created on first use and alive until the process exits.
///
/// Implemented for `u8`, `i32` and `f64`. There is exactly one registered pool per type, so
/// every call to [`global_pool()`][Self::global_pool] for the same type returns the same pool.
///
/// # Example
///
/// ```rust
/// use slot_pool::{Registered, ScopedHandle};
///
/// let pool = i32::global_pool();
/// assert_eq!(pool.block_capacity(), 1024);
///
/// let value = ScopedHandle::<i32>::global();
/// assert!(std::ptr::eq(value.pool(), pool));
/// ```
///
/// This is a sealed trait; the set of registered types is fixed.
///
/// ```rust,compile_fail
/// use slot_pool::{Pool, Registered};
///
/// struct Custom;
///
/// impl Registered for Custom {
///     fn global_pool() -> &'static Pool<Self> {
///         unimplemented!()
///     }
/// }
/// ```
#[expect(private_bounds, reason = "intentional - sealed trait")]
pub trait Registered: Sealed + Sized + Send + 'static {
    /// The process-wide pool for `Self`.
    fn global_pool() -> &'static Pool<Self>;
}

trait Sealed {}

impl Sealed for u8 {}
impl Sealed for i32 {}
impl Sealed for f64 {}

// Statics are never dropped, so these pools release their blocks only when the process exits.
static BYTE_POOL: LazyLock<Pool<u8>> = LazyLock::new(|| {
    Pool::builder()
        .block_capacity(BYTE_BLOCK_CAPACITY)
        .build()
});

static I32_POOL: LazyLock<Pool<i32>> = LazyLock::new(|| {
    Pool::builder()
        .block_capacity(NUMERIC_BLOCK_CAPACITY)
        .build()
});

static F64_POOL: LazyLock<Pool<f64>> = LazyLock::new(|| {
    Pool::builder()
        .block_capacity(NUMERIC_BLOCK_CAPACITY)
        .build()
});

impl Registered for u8 {
    fn global_pool() -> &'static Pool<Self> {
        &BYTE_POOL
    }
}

impl Registered for i32 {
    fn global_pool() -> &'static Pool<Self> {
        &I32_POOL
    }
}

impl Registered for f64 {
    fn global_pool() -> &'static Pool<Self> {
        &F64_POOL
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::ptr;
    use std::thread;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::ScopedHandle;

    assert_impl_all!(u8: Registered);
    assert_impl_all!(i32: Registered);
    assert_impl_all!(f64: Registered);
    assert_not_impl_any!(u16: Registered);
    assert_not_impl_any!(u32: Registered);
    assert_not_impl_any!(i64: Registered);
    assert_not_impl_any!(f32: Registered);
    assert_not_impl_any!(String: Registered);

    #[test]
    fn block_capacities() {
        assert_eq!(u8::global_pool().block_capacity(), 4096);
        assert_eq!(i32::global_pool().block_capacity(), 1024);
        assert_eq!(f64::global_pool().block_capacity(), 1024);
    }

    #[test]
    fn same_pool_on_every_call() {
        assert!(ptr::eq(u8::global_pool(), u8::global_pool()));
        assert!(ptr::eq(i32::global_pool(), i32::global_pool()));
        assert!(ptr::eq(f64::global_pool(), f64::global_pool()));
    }

    #[test]
    fn same_pool_from_every_thread() {
        let here = ptr::from_ref(f64::global_pool()).addr();

        let there = thread::spawn(|| ptr::from_ref(f64::global_pool()).addr())
            .join()
            .unwrap();

        assert_eq!(here, there);
    }

    #[test]
    fn global_handle_uses_registered_pool() {
        let mut handle = ScopedHandle::<u8>::global();
        *handle = b'x';

        assert!(ptr::eq(handle.pool(), u8::global_pool()));
        assert_eq!(*handle, b'x');
        assert!(u8::global_pool().contains_address(ptr::from_ref(&*handle)));
    }
}
