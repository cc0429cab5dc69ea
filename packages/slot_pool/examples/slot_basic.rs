//! Basic usage example for `slot_pool`.
//!
//! Shows keyed allocation, scoped handles, the process-wide pools and how misuse is reported.
//! The pool's own trace-level log output is printed alongside.

use slot_pool::{Error, Pool, Registered, ScopedHandle};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let pool = Pool::<u32>::builder().block_capacity(4).build();

    // Keyed allocation: the key must be given back to release the slot.
    let keys = (0..5)
        .map(|n| pool.allocate_with(n * 10).unwrap())
        .collect::<Vec<_>>();

    println!("After five allocations: {}", pool.stats());

    for key in &keys {
        let value = pool.with_value(key, |value| *value).unwrap();
        println!(
            "block {} slot {} holds {value}",
            key.block_index(),
            key.slot_index()
        );
    }

    for key in keys {
        pool.deallocate(key).unwrap();
    }

    println!("After releasing them: {}", pool.stats());

    // Scoped handles release their slot when they go out of scope.
    {
        let mut first = ScopedHandle::new(&pool);
        let mut second = ScopedHandle::new(&pool);
        *first = 1;
        *second = 2;

        println!("Handles hold {} and {}: {}", *first, *second, pool.stats());
    }

    println!("After the handles went out of scope: {}", pool.stats());

    // Keys are tied to the pool that issued them.
    let other = Pool::<u32>::new();
    let foreign = other.allocate().unwrap();

    match pool.deallocate(foreign) {
        Err(Error::ForeignKey) => println!("Foreign key rejected"),
        result => println!("Unexpected result: {result:?}"),
    }

    // Every registered type has one process-wide pool.
    let mut byte = ScopedHandle::<u8>::global();
    *byte = b'!';

    println!(
        "Global byte pool: {} (block capacity {})",
        u8::global_pool().stats(),
        u8::global_pool().block_capacity()
    );
}
