//! Pre-trade risk
//!
//! The last gate before an order reaches the execution queue. Checks run
//! synchronously inside `submit_order`; the first failing check is the
//! reason reported back to the submitter, exactly once.

pub mod positions;
pub mod pre_trade;
pub mod types;

pub use positions::PositionTracker;
pub use pre_trade::RiskManager;
pub use types::{RiskCheckResult, RiskLimits};
