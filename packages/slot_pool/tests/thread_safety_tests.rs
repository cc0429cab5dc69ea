//! Thread safety integration tests for `slot_pool`.
//!
//! These tests hammer one pool from many threads and verify that no slot is ever handed to two
//! owners at once and that the pool's counters balance once every thread is done.

use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use slot_pool::{Pool, ScopedHandle};

const THREADS: usize = 8;
#[cfg(not(miri))]
const ITERATIONS: usize = 1000;
#[cfg(miri)]
const ITERATIONS: usize = 10; // Miri is slow.

#[test]
fn concurrent_keys_never_share_a_slot() {
    let pool = Arc::new(Pool::<usize>::builder().block_capacity(16).build());
    let live = Arc::new(Mutex::new(HashSet::new()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers = (0..THREADS)
        .map(|thread_index| {
            let pool = Arc::clone(&pool);
            let live = Arc::clone(&live);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();

                for iteration in 0..ITERATIONS {
                    let tag = thread_index * ITERATIONS + iteration;

                    let key = pool.allocate_with(tag).unwrap();
                    let address = pool.slot_ptr(&key).unwrap().as_ptr().addr();

                    assert!(
                        live.lock().unwrap().insert(address),
                        "slot at {address:#x} handed out while still live"
                    );

                    // Nobody else may have touched our value in the meantime.
                    assert_eq!(pool.with_value(&key, |value| *value).unwrap(), tag);

                    assert!(live.lock().unwrap().remove(&address));
                    pool.deallocate(key).unwrap();
                }
            })
        })
        .collect::<Vec<_>>();

    for worker in workers {
        worker.join().unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.allocated(), 0);
    assert_eq!(stats.capacity(), stats.blocks() * 16);
    assert!(live.lock().unwrap().is_empty());
}

#[test]
fn concurrent_handles_never_share_a_slot() {
    let pool = Pool::<usize>::builder().block_capacity(4).build();
    let live = Mutex::new(HashSet::new());

    thread::scope(|s| {
        for thread_index in 0..THREADS {
            let pool = &pool;
            let live = &live;

            s.spawn(move || {
                for iteration in 0..ITERATIONS {
                    // Hold two slots at once so the pool is forced to grow under contention.
                    let mut first = ScopedHandle::new(pool);
                    let mut second = ScopedHandle::new(pool);
                    *first = thread_index;
                    *second = iteration;

                    let first_address = (&raw const *first).addr();
                    let second_address = (&raw const *second).addr();
                    assert_ne!(first_address, second_address);

                    {
                        let mut live = live.lock().unwrap();
                        assert!(live.insert(first_address));
                        assert!(live.insert(second_address));
                    }

                    assert_eq!(*first, thread_index);
                    assert_eq!(*second, iteration);

                    {
                        let mut live = live.lock().unwrap();
                        assert!(live.remove(&first_address));
                        assert!(live.remove(&second_address));
                    }
                }
            });
        }
    });

    assert!(pool.is_empty());

    // Two slots per thread is the most that could ever be live at once.
    assert!(pool.capacity() <= THREADS * 2 + pool.block_capacity());
}

#[test]
fn pool_can_be_shared_via_static() {
    static POOL: std::sync::LazyLock<Pool<usize>> = std::sync::LazyLock::new(Pool::new);

    thread::scope(|s| {
        for thread_index in 0..THREADS {
            s.spawn(move || {
                let mut value = ScopedHandle::new(&*POOL);
                *value = thread_index;
                assert_eq!(*value, thread_index);
            });
        }
    });

    assert!(POOL.is_empty());
}

#[test]
fn stats_stay_consistent_under_contention() {
    let pool = Pool::<u32>::builder().block_capacity(8).build();

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ITERATIONS {
                    let key = pool.allocate().unwrap();

                    let stats = pool.stats();
                    assert!(stats.allocated() >= 1);
                    assert!(stats.allocated() <= stats.capacity());
                    assert_eq!(stats.capacity(), stats.blocks() * 8);

                    pool.deallocate(key).unwrap();
                }
            });
        }
    });

    assert_eq!(pool.stats().allocated(), 0);
}
