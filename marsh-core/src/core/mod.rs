//! Shared core types for the trading data plane
//!
//! This module provides the building blocks every subsystem leans on:
//! - `Protocol` / `Side`: single-byte venue and side tags
//! - `fixed_point`: 9-decimal integer price representation
//! - `queue`: wait-free bounded SPSC/MPSC rings (the thread spine)
//! - `errors`: construction-time error kinds

pub mod errors;
pub mod queue;
pub mod types;

pub use errors::ConfigError;
pub use queue::{mpsc, spsc, MpscConsumer, MpscProducer, SpscConsumer, SpscProducer};
pub use types::{fixed_point, Protocol, Side};
