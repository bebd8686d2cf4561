//! Position tracking
//!
//! Signed per-market positions, updated by the report worker and read by
//! the risk path. Guarded by a mutex; risk reads may observe a value one
//! fill behind, which the check tolerates.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Per-market signed position tracker
#[derive(Debug, Default)]
pub struct PositionTracker {
    positions: Mutex<HashMap<String, f64>>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a signed delta (+buy / -sell) to a market's position
    pub fn update(&self, market_id: &str, delta: f64) {
        let mut positions = self.positions.lock();
        *positions.entry(market_id.to_string()).or_insert(0.0) += delta;
    }

    /// Current signed position for a market (0 when never traded)
    pub fn get(&self, market_id: &str) -> f64 {
        self.positions.lock().get(market_id).copied().unwrap_or(0.0)
    }

    /// Sum of absolute positions across all markets
    pub fn total(&self) -> f64 {
        self.positions.lock().values().map(|p| p.abs()).sum()
    }

    /// Number of markets with any recorded position
    pub fn market_count(&self) -> usize {
        self.positions.lock().len()
    }

    pub fn reset(&self) {
        self.positions.lock().clear();
    }
}
