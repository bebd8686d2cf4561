//! Pre-Trade Risk Checks
//!
//! Runs synchronously inside `submit_order`, before an order is created.
//! Checks execute in a fixed order and the first failure becomes the
//! rejection reason:
//!
//! 1. Order size against `max_order_size`
//! 2. Projected per-market position against `max_position_per_market`
//! 3. Total absolute position against `max_total_position`
//! 4. Sliding one-second submission window against `max_orders_per_second`
//!
//! A passing check sequence appends the submission timestamp to the rate
//! window; rejected orders never consume rate budget.

use std::collections::VecDeque;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::core::Side;
use crate::execution::types::OrderRequest;
use crate::perf::timing::now_ns;
use crate::risk::positions::PositionTracker;
use crate::risk::types::{RiskCheckResult, RiskLimits};

const RATE_WINDOW_NS: i64 = 1_000_000_000;

/// Pre-trade risk manager
pub struct RiskManager {
    limits: RwLock<RiskLimits>,
    window: Mutex<VecDeque<i64>>,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits: RwLock::new(limits),
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Replace the limits at runtime
    pub fn set_limits(&self, limits: RiskLimits) {
        *self.limits.write() = limits;
    }

    pub fn limits(&self) -> RiskLimits {
        self.limits.read().clone()
    }

    /// Run all checks for a request against current positions
    pub fn check(&self, req: &OrderRequest, positions: &PositionTracker) -> RiskCheckResult {
        let limits = self.limits.read();

        // 1. Order size
        if req.quantity > limits.max_order_size {
            debug!(
                market = %req.market_id,
                quantity = req.quantity,
                limit = limits.max_order_size,
                "Risk reject: order size"
            );
            return RiskCheckResult::fail(format!(
                "Order size {} exceeds limit {}",
                req.quantity, limits.max_order_size
            ));
        }

        // 2. Projected position for the market
        let delta = match req.side {
            Side::Buy => req.quantity,
            Side::Sell => -req.quantity,
        };
        let projected = positions.get(&req.market_id) + delta;
        if projected.abs() > limits.max_position_per_market {
            debug!(
                market = %req.market_id,
                projected,
                limit = limits.max_position_per_market,
                "Risk reject: market position limit"
            );
            return RiskCheckResult::fail(format!(
                "Would exceed position limit for market {} ({} > {})",
                req.market_id,
                projected.abs(),
                limits.max_position_per_market
            ));
        }

        // 3. Total position across markets
        let total = positions.total() + req.quantity;
        if total > limits.max_total_position {
            return RiskCheckResult::fail(format!(
                "Would exceed total position limit ({} > {})",
                total, limits.max_total_position
            ));
        }

        // 4. Submission rate over the trailing second
        let now = now_ns();
        let mut window = self.window.lock();
        while let Some(&oldest) = window.front() {
            if now - oldest > RATE_WINDOW_NS {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= limits.max_orders_per_second {
            return RiskCheckResult::fail(format!(
                "Rate limit exceeded ({} orders/s)",
                limits.max_orders_per_second
            ));
        }
        window.push_back(now);

        RiskCheckResult::pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Protocol;
    use crate::execution::types::OrderType;

    fn request(side: Side, quantity: f64) -> OrderRequest {
        OrderRequest {
            market_id: "M1".to_string(),
            venue: Protocol::KalshiWs,
            side,
            order_type: OrderType::Limit,
            price: 0.50,
            quantity,
            on_report: None,
        }
    }

    fn limits() -> RiskLimits {
        RiskLimits {
            max_order_size: 100.0,
            max_position_per_market: 500.0,
            max_total_position: 1_000.0,
            max_orders_per_second: 1_000,
            max_loss_per_day: 1_000.0,
        }
    }

    #[test]
    fn test_valid_order_passes() {
        let rm = RiskManager::new(limits());
        let positions = PositionTracker::new();

        let result = rm.check(&request(Side::Buy, 50.0), &positions);
        assert!(result.passed);
        assert!(result.reason.is_empty());
    }

    #[test]
    fn test_order_size_check_is_first_and_names_size() {
        let rm = RiskManager::new(limits());
        let positions = PositionTracker::new();

        let result = rm.check(&request(Side::Buy, 200.0), &positions);
        assert!(!result.passed);
        assert!(
            result.reason.contains("size"),
            "reason must name the size check: {}",
            result.reason
        );
    }

    #[test]
    fn test_market_position_limit() {
        let rm = RiskManager::new(limits());
        let positions = PositionTracker::new();
        positions.update("M1", 480.0);

        // 480 + 50 = 530 > 500
        let result = rm.check(&request(Side::Buy, 50.0), &positions);
        assert!(!result.passed);
        assert!(result.reason.contains("position limit for market"));

        // Selling reduces the projected position and passes
        let result = rm.check(&request(Side::Sell, 50.0), &positions);
        assert!(result.passed);
    }

    #[test]
    fn test_short_positions_count_absolute() {
        let rm = RiskManager::new(limits());
        let positions = PositionTracker::new();
        positions.update("M1", -480.0);

        let result = rm.check(&request(Side::Sell, 50.0), &positions);
        assert!(!result.passed, "projected -530 must breach the 500 limit");
    }

    #[test]
    fn test_total_position_limit() {
        let rm = RiskManager::new(limits());
        let positions = PositionTracker::new();
        positions.update("M1", 490.0);
        positions.update("M2", -490.0);

        // Totals are absolute: 980 + 50 > 1000
        let result = rm.check(&request(Side::Buy, 50.0), &positions);
        assert!(!result.passed);
        assert!(result.reason.contains("total position"));
    }

    #[test]
    fn test_rate_limit_window() {
        let rm = RiskManager::new(RiskLimits {
            max_orders_per_second: 5,
            ..limits()
        });
        let positions = PositionTracker::new();

        for i in 0..5 {
            assert!(
                rm.check(&request(Side::Buy, 1.0), &positions).passed,
                "submission {} within budget",
                i
            );
        }

        let result = rm.check(&request(Side::Buy, 1.0), &positions);
        assert!(!result.passed);
        assert!(result.reason.contains("Rate limit"));
    }

    #[test]
    fn test_rejected_orders_do_not_consume_rate_budget() {
        let rm = RiskManager::new(RiskLimits {
            max_orders_per_second: 2,
            ..limits()
        });
        let positions = PositionTracker::new();

        // Size rejections happen before the window is touched
        for _ in 0..10 {
            assert!(!rm.check(&request(Side::Buy, 500.0), &positions).passed);
        }

        assert!(rm.check(&request(Side::Buy, 1.0), &positions).passed);
        assert!(rm.check(&request(Side::Buy, 1.0), &positions).passed);
    }

    #[test]
    fn test_set_limits_takes_effect() {
        let rm = RiskManager::new(limits());
        let positions = PositionTracker::new();

        assert!(rm.check(&request(Side::Buy, 50.0), &positions).passed);

        rm.set_limits(RiskLimits {
            max_order_size: 10.0,
            ..limits()
        });
        assert!(!rm.check(&request(Side::Buy, 50.0), &positions).passed);
    }
}
