//! Test helper utilities
//!
//! Frame builders and polling helpers shared by unit tests, integration
//! tests, and the simulated-venue binaries.

pub mod frames;

use std::time::{Duration, Instant};

/// Poll `cond` until it returns true or `timeout` elapses.
///
/// Worker threads make updates visible with a bounded delay; tests wait
/// for the condition instead of sleeping fixed amounts.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}
