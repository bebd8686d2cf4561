use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing logger
///
/// `RUST_LOG` overrides `log_level` when set. Safe to call more than
/// once; later calls are no-ops.
pub fn init_logger(log_level: &str, json_logs: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let result = if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
    };

    // Already-initialized is fine (tests, embedded hosts)
    let _ = result;
}
