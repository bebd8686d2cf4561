//! Callback panic isolation
//!
//! User-registered callbacks run on the worker threads. A worker must
//! never die to a panicking callback, so every invocation goes through
//! this guard: the panic is caught, logged, and the worker continues.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Run a user callback, containing any panic it raises.
///
/// Returns `true` when the callback completed normally.
pub fn run_guarded<F: FnOnce()>(context: &'static str, f: F) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<no message>".to_string());
            error!(context, message = %message, "User callback panicked; worker continues");
            false
        }
    }
}
