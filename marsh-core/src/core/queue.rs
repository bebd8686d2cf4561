//! Wait-Free Bounded Ring Buffers
//!
//! The spine between threads. Two flavors:
//! - `spsc`: single-producer single-consumer, one reserved slot to
//!   disambiguate full from empty
//! - `mpsc`: multi-producer single-consumer, per-slot sequence counters
//!   with a CAS-advanced shared tail (ABA-free)
//!
//! Both are fixed-capacity (power of two, enforced at construction) and
//! wait-free per operation: `try_push`/`try_pop` never block. Endpoints
//! live on separate cache lines (`CachePadded`) so producer and consumer
//! never false-share.
//!
//! The producer/consumer contracts are enforced by the type system:
//! construction returns split handles, and only the MPSC producer is
//! cloneable. `len()`/`is_empty()` may race with concurrent operations
//! and are advisory only.

use crossbeam::utils::CachePadded;
use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::errors::ConfigError;

fn check_capacity(capacity: usize) -> Result<(), ConfigError> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(ConfigError::InvalidCapacity { got: capacity });
    }
    Ok(())
}

/// Single-producer single-consumer bounded ring
pub mod spsc {
    use super::*;

    struct Inner<T> {
        head: CachePadded<AtomicUsize>,
        tail: CachePadded<AtomicUsize>,
        mask: usize,
        buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    }

    // The protocol guarantees a slot is written by exactly one side at a
    // time; T only needs to be sendable across the handle boundary.
    unsafe impl<T: Send> Send for Inner<T> {}
    unsafe impl<T: Send> Sync for Inner<T> {}

    impl<T> Drop for Inner<T> {
        fn drop(&mut self) {
            let mut head = *self.head.get_mut();
            let tail = *self.tail.get_mut();
            while head != tail {
                unsafe { (*self.buffer[head].get()).assume_init_drop() };
                head = (head + 1) & self.mask;
            }
        }
    }

    /// Producer endpoint. Exactly one exists per queue; not cloneable.
    pub struct SpscProducer<T> {
        inner: Arc<Inner<T>>,
        // Single-producer contract: the handle must not be shared.
        _not_sync: PhantomData<Cell<()>>,
    }

    /// Consumer endpoint. Exactly one exists per queue; not cloneable.
    pub struct SpscConsumer<T> {
        inner: Arc<Inner<T>>,
        _not_sync: PhantomData<Cell<()>>,
    }

    unsafe impl<T: Send> Send for SpscProducer<T> {}
    unsafe impl<T: Send> Send for SpscConsumer<T> {}

    /// Create a bounded SPSC queue with the given power-of-two capacity.
    ///
    /// One slot is reserved to distinguish full from empty, so the queue
    /// holds at most `capacity - 1` values.
    pub fn channel<T>(
        capacity: usize,
    ) -> Result<(SpscProducer<T>, SpscConsumer<T>), ConfigError> {
        check_capacity(capacity)?;

        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let inner = Arc::new(Inner {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            mask: capacity - 1,
            buffer,
        });

        Ok((
            SpscProducer {
                inner: Arc::clone(&inner),
                _not_sync: PhantomData,
            },
            SpscConsumer {
                inner,
                _not_sync: PhantomData,
            },
        ))
    }

    impl<T> SpscProducer<T> {
        /// Try to push a value. Returns `false` (dropping the value) if
        /// the queue is full.
        #[inline]
        pub fn try_push(&self, value: T) -> bool {
            let inner = &*self.inner;
            let tail = inner.tail.load(Ordering::Relaxed);
            let next = (tail + 1) & inner.mask;

            if next == inner.head.load(Ordering::Acquire) {
                return false; // Full
            }

            unsafe { (*inner.buffer[tail].get()).write(value) };
            inner.tail.store(next, Ordering::Release);
            true
        }

        /// Approximate number of buffered values (advisory)
        pub fn len(&self) -> usize {
            len_of(&self.inner)
        }

        /// Approximate emptiness check (advisory)
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Maximum number of values the queue can hold
        pub fn capacity(&self) -> usize {
            self.inner.mask // one slot reserved
        }
    }

    impl<T> SpscConsumer<T> {
        /// Try to pop a value. Returns `None` if the queue is empty.
        #[inline]
        pub fn try_pop(&self) -> Option<T> {
            let inner = &*self.inner;
            let head = inner.head.load(Ordering::Relaxed);

            if head == inner.tail.load(Ordering::Acquire) {
                return None; // Empty
            }

            let value = unsafe { (*inner.buffer[head].get()).assume_init_read() };
            inner.head.store((head + 1) & inner.mask, Ordering::Release);
            Some(value)
        }

        /// Approximate number of buffered values (advisory)
        pub fn len(&self) -> usize {
            len_of(&self.inner)
        }

        /// Approximate emptiness check (advisory)
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Maximum number of values the queue can hold
        pub fn capacity(&self) -> usize {
            self.inner.mask
        }
    }

    fn len_of<T>(inner: &Inner<T>) -> usize {
        let head = inner.head.load(Ordering::Relaxed);
        let tail = inner.tail.load(Ordering::Relaxed);
        tail.wrapping_sub(head) & inner.mask
    }
}

/// Multi-producer single-consumer bounded ring
///
/// Each slot carries a sequence counter. A producer claims a position by
/// CAS-advancing the shared tail, writes the payload, then publishes
/// `sequence = pos + 1`. The consumer matches `sequence == head + 1`,
/// reads, republishes `sequence = head + capacity` for the next lap, and
/// advances head with a relaxed store (it is the only consumer).
pub mod mpsc {
    use super::*;

    struct Slot<T> {
        sequence: AtomicUsize,
        data: UnsafeCell<MaybeUninit<T>>,
    }

    struct Inner<T> {
        head: CachePadded<AtomicUsize>,
        tail: CachePadded<AtomicUsize>,
        mask: usize,
        capacity: usize,
        buffer: Box<[Slot<T>]>,
    }

    unsafe impl<T: Send> Send for Inner<T> {}
    unsafe impl<T: Send> Sync for Inner<T> {}

    impl<T> Drop for Inner<T> {
        fn drop(&mut self) {
            let head = *self.head.get_mut();
            let tail = *self.tail.get_mut();
            let mut pos = head;
            while pos != tail {
                let slot = &mut self.buffer[pos & self.mask];
                // Only published slots hold initialized data
                if *slot.sequence.get_mut() == pos.wrapping_add(1) {
                    unsafe { (*slot.data.get()).assume_init_drop() };
                }
                pos = pos.wrapping_add(1);
            }
        }
    }

    /// Producer endpoint. Cloneable; any number of threads may push.
    pub struct MpscProducer<T> {
        inner: Arc<Inner<T>>,
    }

    /// Consumer endpoint. Exactly one exists per queue; not cloneable.
    pub struct MpscConsumer<T> {
        inner: Arc<Inner<T>>,
        _not_sync: PhantomData<Cell<()>>,
    }

    unsafe impl<T: Send> Send for MpscProducer<T> {}
    unsafe impl<T: Send> Sync for MpscProducer<T> {}
    unsafe impl<T: Send> Send for MpscConsumer<T> {}

    impl<T> Clone for MpscProducer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    /// Create a bounded MPSC queue with the given power-of-two capacity.
    pub fn channel<T>(
        capacity: usize,
    ) -> Result<(MpscProducer<T>, MpscConsumer<T>), ConfigError> {
        check_capacity(capacity)?;

        let buffer = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                data: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let inner = Arc::new(Inner {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            mask: capacity - 1,
            capacity,
            buffer,
        });

        Ok((
            MpscProducer {
                inner: Arc::clone(&inner),
            },
            MpscConsumer {
                inner,
                _not_sync: PhantomData,
            },
        ))
    }

    impl<T> MpscProducer<T> {
        /// Try to push a value. Returns `false` (dropping the value) if
        /// the queue is full. Safe to call from any number of threads.
        #[inline]
        pub fn try_push(&self, value: T) -> bool {
            let inner = &*self.inner;
            let idx;
            let claimed;

            let mut pos = inner.tail.load(Ordering::Relaxed);
            loop {
                let slot = &inner.buffer[pos & inner.mask];
                let seq = slot.sequence.load(Ordering::Acquire);
                let diff = seq as isize - pos as isize;

                if diff == 0 {
                    // Slot free for this lap; try to claim the position
                    match inner.tail.compare_exchange_weak(
                        pos,
                        pos.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => {
                            idx = pos & inner.mask;
                            claimed = pos;
                            break;
                        }
                        Err(actual) => pos = actual,
                    }
                } else if diff < 0 {
                    return false; // Full
                } else {
                    // Another producer claimed this position; reload
                    pos = inner.tail.load(Ordering::Relaxed);
                }
            }

            let slot = &inner.buffer[idx];
            unsafe { (*slot.data.get()).write(value) };
            slot.sequence.store(claimed.wrapping_add(1), Ordering::Release);
            true
        }

        /// Approximate number of buffered values (advisory)
        pub fn len(&self) -> usize {
            len_of(&self.inner)
        }

        /// Approximate emptiness check (advisory)
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Maximum number of values the queue can hold
        pub fn capacity(&self) -> usize {
            self.inner.capacity
        }
    }

    impl<T> MpscConsumer<T> {
        /// Try to pop a value. Returns `None` if the queue is empty.
        #[inline]
        pub fn try_pop(&self) -> Option<T> {
            let inner = &*self.inner;
            let pos = inner.head.load(Ordering::Relaxed);
            let slot = &inner.buffer[pos & inner.mask];
            let seq = slot.sequence.load(Ordering::Acquire);

            let diff = seq as isize - pos.wrapping_add(1) as isize;
            if diff < 0 {
                return None; // Empty (or producer mid-write)
            }

            let value = unsafe { (*slot.data.get()).assume_init_read() };
            slot.sequence
                .store(pos.wrapping_add(inner.capacity), Ordering::Release);
            inner.head.store(pos.wrapping_add(1), Ordering::Relaxed);
            Some(value)
        }

        /// Approximate number of buffered values (advisory)
        pub fn len(&self) -> usize {
            len_of(&self.inner)
        }

        /// Approximate emptiness check (advisory)
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Maximum number of values the queue can hold
        pub fn capacity(&self) -> usize {
            self.inner.capacity
        }
    }

    fn len_of<T>(inner: &Inner<T>) -> usize {
        let head = inner.head.load(Ordering::Relaxed);
        let tail = inner.tail.load(Ordering::Relaxed);
        tail.wrapping_sub(head).min(inner.capacity)
    }
}

pub use mpsc::{MpscConsumer, MpscProducer};
pub use spsc::{SpscConsumer, SpscProducer};

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_capacity_must_be_power_of_two() {
        assert!(spsc::channel::<u64>(0).is_err());
        assert!(spsc::channel::<u64>(100).is_err());
        assert!(spsc::channel::<u64>(64).is_ok());
        assert!(mpsc::channel::<u64>(3).is_err());
        assert!(mpsc::channel::<u64>(16).is_ok());
    }

    #[test]
    fn test_spsc_fifo_order() {
        let (tx, rx) = spsc::channel::<u32>(16).unwrap();

        for i in 0..10 {
            assert!(tx.try_push(i));
        }
        for i in 0..10 {
            assert_eq!(rx.try_pop(), Some(i));
        }
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_spsc_full_at_capacity_minus_one() {
        let (tx, rx) = spsc::channel::<u32>(8).unwrap();
        assert_eq!(tx.capacity(), 7);

        // One slot reserved: 7 values fit, the 8th is rejected
        for i in 0..7 {
            assert!(tx.try_push(i), "push {} should succeed", i);
        }
        assert!(!tx.try_push(7), "queue should be full");

        // A pop frees exactly one slot
        assert_eq!(rx.try_pop(), Some(0));
        assert!(tx.try_push(7));
        assert!(!tx.try_push(8));
    }

    #[test]
    fn test_spsc_wraps_around() {
        let (tx, rx) = spsc::channel::<u32>(4).unwrap();

        for round in 0..100u32 {
            assert!(tx.try_push(round));
            assert_eq!(rx.try_pop(), Some(round));
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn test_spsc_cross_thread() {
        let (tx, rx) = spsc::channel::<u64>(1024).unwrap();
        const COUNT: u64 = 100_000;

        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                while !tx.try_push(i) {
                    thread::yield_now();
                }
            }
        });

        let mut expected = 0u64;
        while expected < COUNT {
            if let Some(v) = rx.try_pop() {
                assert_eq!(v, expected, "values must arrive in push order");
                expected += 1;
            } else {
                thread::yield_now();
            }
        }

        producer.join().unwrap();
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_spsc_drops_buffered_values() {
        let (tx, _rx) = spsc::channel::<String>(8).unwrap();
        tx.try_push("a".to_string());
        tx.try_push("b".to_string());
        // Dropping both endpoints must free the two buffered strings
    }

    #[test]
    fn test_mpsc_basic() {
        let (tx, rx) = mpsc::channel::<u32>(8).unwrap();

        for i in 0..8 {
            assert!(tx.try_push(i), "push {} should succeed", i);
        }
        assert!(!tx.try_push(8), "queue should be full at capacity");

        for i in 0..8 {
            assert_eq!(rx.try_pop(), Some(i));
        }
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_mpsc_slot_reuse_across_laps() {
        let (tx, rx) = mpsc::channel::<u32>(4).unwrap();

        for round in 0..50u32 {
            assert!(tx.try_push(round));
            assert!(tx.try_push(round + 1000));
            assert_eq!(rx.try_pop(), Some(round));
            assert_eq!(rx.try_pop(), Some(round + 1000));
        }
    }

    #[test]
    fn test_mpsc_multi_producer_no_loss_no_dup() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 10_000;

        let (tx, rx) = mpsc::channel::<u64>(1024).unwrap();

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    // Disjoint value sets per producer
                    for i in 0..PER_PRODUCER {
                        let value = p * PER_PRODUCER + i;
                        while !tx.try_push(value) {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut seen = vec![false; (PRODUCERS * PER_PRODUCER) as usize];
        let mut popped = 0u64;
        while popped < PRODUCERS * PER_PRODUCER {
            if let Some(v) = rx.try_pop() {
                assert!(!seen[v as usize], "value {} delivered twice", v);
                seen[v as usize] = true;
                popped += 1;
            } else {
                thread::yield_now();
            }
        }

        for h in handles {
            h.join().unwrap();
        }
        assert!(seen.iter().all(|&s| s), "every accepted value must be popped");
    }

    #[test]
    fn test_mpsc_per_producer_order_preserved() {
        const PER_PRODUCER: u64 = 5_000;
        let (tx, rx) = mpsc::channel::<(u8, u64)>(256).unwrap();

        let handles: Vec<_> = (0..2u8)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        while !tx.try_push((p, i)) {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut next = [0u64; 2];
        let mut popped = 0u64;
        while popped < 2 * PER_PRODUCER {
            if let Some((p, i)) = rx.try_pop() {
                assert_eq!(i, next[p as usize], "within-source order must hold");
                next[p as usize] += 1;
                popped += 1;
            } else {
                thread::yield_now();
            }
        }

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_mpsc_drops_buffered_values() {
        let (tx, _rx) = mpsc::channel::<Vec<u8>>(8).unwrap();
        tx.try_push(vec![1, 2, 3]);
        tx.try_push(vec![4, 5, 6]);
        // Dropping the queue with buffered values must not leak
    }
}
