//! Performance utilities
//!
//! Low-level support for the latency-sensitive workers:
//! - **Timing**: monotonic nanosecond clock, scope timers, latency
//!   statistics with lazy-sorted percentiles
//! - **CPU placement**: thread-to-core pinning and realtime scheduling
//!   hints (advisory; failure degrades latency, never correctness)
//! - **Metrics**: lock-free counter primitives shared by the stats
//!   surfaces

pub mod cpu;
pub mod metrics;
pub mod timing;

pub use cpu::{
    configure_low_latency, current_core, num_cores, pin_to_core, set_realtime_priority,
    validate_core, validate_priority, PinResult,
};
pub use metrics::AtomicF64;
pub use timing::{busy_wait_ns, measure_ns, now_ns, now_us, LatencyStats, ScopeTimer};
