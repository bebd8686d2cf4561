//! Risk limit configuration and check results

use serde::{Deserialize, Serialize};

/// Pre-trade risk limits
///
/// Plain option record supplied at engine construction; no environment
/// parsing happens in the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Largest single order quantity
    pub max_order_size: f64,

    /// Largest absolute position per market
    pub max_position_per_market: f64,

    /// Largest sum of absolute positions across markets
    pub max_total_position: f64,

    /// Submissions allowed per rolling second
    pub max_orders_per_second: usize,

    /// Daily loss limit (reserved for the PnL reconciler)
    pub max_loss_per_day: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_order_size: 10_000.0,
            max_position_per_market: 50_000.0,
            max_total_position: 200_000.0,
            max_orders_per_second: 10,
            max_loss_per_day: 1_000.0,
        }
    }
}

/// Result of a pre-trade check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskCheckResult {
    pub passed: bool,
    /// Reason for the first failing check; empty on pass
    pub reason: String,
}

impl RiskCheckResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: String::new(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}
