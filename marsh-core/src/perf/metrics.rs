//! Lock-Free Metric Primitives
//!
//! Atomic building blocks for the per-component stats surfaces. Counters
//! use relaxed ordering: stats are advisory snapshots, never
//! synchronization points.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Atomic f64 built on a u64 bit pattern
///
/// Used for accumulated volumes and theoretical profit, which are f64 in
/// the data model but must be updated from worker threads without a lock.
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline(always)]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline(always)]
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Add `delta` with a CAS loop
    #[inline]
    pub fn fetch_add(&self, delta: f64) -> f64 {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return f64::from_bits(current),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Exponential moving average with weight 7/8 on history
///
/// The smoothing the handler and router apply to latency samples:
/// `avg = (avg * 7 + sample) / 8`. Single-writer; readers may observe a
/// slightly stale value.
#[derive(Debug, Default)]
pub struct EmaNanos {
    value: AtomicI64,
}

impl EmaNanos {
    pub const fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
        }
    }

    /// Fold one sample into the average
    #[inline(always)]
    pub fn update(&self, sample_ns: i64) {
        let prev = self.value.load(Ordering::Relaxed);
        self.value
            .store((prev * 7 + sample_ns) / 8, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}
