//! High-Resolution Timing Utilities
//!
//! Nanosecond-precision timing for latency measurement, jitter analysis,
//! and profiling. All timestamps in the process come from one monotonic
//! clock anchored at first use, so cross-component arithmetic
//! (quote ages, order latencies) is always valid.

use std::sync::OnceLock;
use std::time::Instant;

fn clock_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

/// Current monotonic timestamp in nanoseconds
#[inline]
pub fn now_ns() -> i64 {
    clock_origin().elapsed().as_nanos() as i64
}

/// Current monotonic timestamp in microseconds
#[inline]
pub fn now_us() -> i64 {
    clock_origin().elapsed().as_micros() as i64
}

/// Measure execution time of a closure in nanoseconds
#[inline]
pub fn measure_ns<F: FnOnce()>(f: F) -> i64 {
    let start = Instant::now();
    f();
    start.elapsed().as_nanos() as i64
}

/// Busy-wait for a duration. More precise than `thread::sleep` for short
/// waits; burns a core while spinning.
pub fn busy_wait_ns(nanoseconds: i64) {
    let start = Instant::now();
    while (start.elapsed().as_nanos() as i64) < nanoseconds {
        std::hint::spin_loop();
    }
}

/// RAII scope timer writing elapsed nanoseconds to a slot on drop
///
/// ```
/// use marsh_core::perf::ScopeTimer;
///
/// let mut elapsed_ns = 0i64;
/// {
///     let _timer = ScopeTimer::new(&mut elapsed_ns);
///     // ... timed work ...
/// }
/// assert!(elapsed_ns >= 0);
/// ```
pub struct ScopeTimer<'a> {
    start: Instant,
    output: &'a mut i64,
}

impl<'a> ScopeTimer<'a> {
    pub fn new(output: &'a mut i64) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl Drop for ScopeTimer<'_> {
    fn drop(&mut self) {
        *self.output = self.start.elapsed().as_nanos() as i64;
    }
}

/// Latency statistics accumulator
///
/// Tracks min, max, mean, percentiles, and jitter. Percentile queries
/// sort the sample buffer lazily: the first query after a `record`
/// sorts once, subsequent queries reuse the sorted buffer.
pub struct LatencyStats {
    samples: Vec<i64>,
    sum: i64,
    min: i64,
    max: i64,
    sorted: bool,
}

impl LatencyStats {
    /// Create with a pre-reserved sample buffer
    pub fn new(reserve: usize) -> Self {
        Self {
            samples: Vec::with_capacity(reserve),
            sum: 0,
            min: i64::MAX,
            max: 0,
            sorted: false,
        }
    }

    /// Record one latency sample. Invalidates any previous sort.
    pub fn record(&mut self, latency_ns: i64) {
        self.samples.push(latency_ns);
        self.sum += latency_ns;
        self.sorted = false;

        if latency_ns < self.min {
            self.min = latency_ns;
        }
        if latency_ns > self.max {
            self.max = latency_ns;
        }
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn min(&self) -> i64 {
        if self.samples.is_empty() {
            0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum as f64 / self.samples.len() as f64
    }

    /// Sample standard deviation (n - 1 denominator)
    pub fn stddev(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }

        let m = self.mean();
        let sq_sum: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let d = s as f64 - m;
                d * d
            })
            .sum();
        (sq_sum / (self.samples.len() - 1) as f64).sqrt()
    }

    /// Percentile query, `p` in [0, 1]. Triggers one sort if samples
    /// were recorded since the last query.
    pub fn percentile(&mut self, p: f64) -> i64 {
        if self.samples.is_empty() {
            return 0;
        }

        if !self.sorted {
            self.samples.sort_unstable();
            self.sorted = true;
        }

        let idx = (p * (self.samples.len() - 1) as f64) as usize;
        self.samples[idx]
    }

    pub fn p50(&mut self) -> i64 {
        self.percentile(0.50)
    }

    pub fn p90(&mut self) -> i64 {
        self.percentile(0.90)
    }

    pub fn p95(&mut self) -> i64 {
        self.percentile(0.95)
    }

    pub fn p99(&mut self) -> i64 {
        self.percentile(0.99)
    }

    pub fn p999(&mut self) -> i64 {
        self.percentile(0.999)
    }

    /// Jitter: stddev / mean. Zero when the mean is zero.
    pub fn jitter(&self) -> f64 {
        let m = self.mean();
        if m == 0.0 {
            return 0.0;
        }
        self.stddev() / m
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.sum = 0;
        self.min = i64::MAX;
        self.max = 0;
        self.sorted = false;
    }

    /// One-line human-readable summary
    pub fn summary(&mut self) -> String {
        format!(
            "n={} min={}ns max={}ns mean={:.2}ns p50={}ns p99={}ns jitter={:.2}%",
            self.count(),
            self.min(),
            self.max(),
            self.mean(),
            self.p50(),
            self.p99(),
            self.jitter() * 100.0
        )
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// Run a closure `iterations` times and collect per-call latency stats
pub fn benchmark<F: FnMut()>(mut f: F, iterations: usize) -> LatencyStats {
    let mut stats = LatencyStats::new(iterations);
    for _ in 0..iterations {
        let start = Instant::now();
        f();
        stats.record(start.elapsed().as_nanos() as i64);
    }
    stats
}
