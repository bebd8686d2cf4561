//! Order book representation
//!
//! Two price-ordered ladders per market: bids iterated descending, asks
//! ascending. A size of zero deletes a level. Crossed books
//! (`best_bid > best_ask`) are tolerated and stored as-is; consumers
//! decide via `is_crossed`/`age_ns` whether that is an opportunity or a
//! stale-data signal. Rejecting crossed updates here would hide exactly
//! the state the arbitrage scan wants to see.

use std::collections::BTreeMap;

use crate::core::types::fixed_point;
use crate::data::types::{BookLevel, OrderBookSnapshot};
use crate::perf::timing::now_ns;

/// One side of an order book: fixed-point price -> size
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookSide {
    levels: BTreeMap<u64, f64>,
}

impl BookSide {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert/replace a level; `size <= 0` deletes it
    pub fn update(&mut self, price: f64, size: f64) {
        let key = fixed_point::key_from_f64(price);
        if size <= 0.0 {
            self.levels.remove(&key);
        } else {
            self.levels.insert(key, size);
        }
    }

    /// Highest price on this side (best for bids)
    pub fn highest(&self) -> f64 {
        self.levels
            .last_key_value()
            .map(|(&p, _)| fixed_point::key_to_f64(p))
            .unwrap_or(0.0)
    }

    /// Lowest price on this side (best for asks)
    pub fn lowest(&self) -> f64 {
        self.levels
            .first_key_value()
            .map(|(&p, _)| fixed_point::key_to_f64(p))
            .unwrap_or(0.0)
    }

    /// Size resting at an exact price, 0 if no level
    pub fn size_at(&self, price: f64) -> f64 {
        self.levels
            .get(&fixed_point::key_from_f64(price))
            .copied()
            .unwrap_or(0.0)
    }

    /// Total size across the first `depth` levels from the given end
    /// (`depth = None` sums the whole side)
    pub fn total_size(&self, depth: Option<usize>, descending: bool) -> f64 {
        let take = depth.unwrap_or(usize::MAX);
        if descending {
            self.levels.values().rev().take(take).sum()
        } else {
            self.levels.values().take(take).sum()
        }
    }

    /// Best-first view of the top `n` levels
    pub fn top(&self, n: usize, descending: bool, timestamp_ns: i64) -> Vec<BookLevel> {
        let level = |(&price, &size): (&u64, &f64)| BookLevel {
            price: fixed_point::key_to_f64(price),
            size,
            timestamp_ns,
        };
        if descending {
            self.levels.iter().rev().take(n).map(level).collect()
        } else {
            self.levels.iter().take(n).map(level).collect()
        }
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

/// Full order book for one market
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBook {
    market_id: String,
    bids: BookSide,
    asks: BookSide,
    sequence: u32,
    last_update_ns: i64,
}

impl OrderBook {
    pub fn new(market_id: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            bids: BookSide::new(),
            asks: BookSide::new(),
            sequence: 0,
            last_update_ns: 0,
        }
    }

    pub fn market_id(&self) -> &str {
        &self.market_id
    }

    /// Upsert one bid level, stamping the book with the current clock
    pub fn update_bid(&mut self, price: f64, size: f64) {
        self.bids.update(price, size);
        self.last_update_ns = now_ns();
    }

    /// Upsert one ask level, stamping the book with the current clock
    pub fn update_ask(&mut self, price: f64, size: f64) {
        self.asks.update(price, size);
        self.last_update_ns = now_ns();
    }

    /// Replace the book from a snapshot. Idempotent: applying the same
    /// snapshot twice leaves identical state.
    pub fn apply(&mut self, snapshot: &OrderBookSnapshot) {
        self.bids.clear();
        self.asks.clear();

        for level in &snapshot.bids {
            self.bids.update(level.price, level.size);
        }
        for level in &snapshot.asks {
            self.asks.update(level.price, level.size);
        }

        self.sequence = snapshot.sequence;
        self.last_update_ns = snapshot.timestamp_ns;
    }

    pub fn best_bid(&self) -> f64 {
        self.bids.highest()
    }

    pub fn best_ask(&self) -> f64 {
        self.asks.lowest()
    }

    pub fn mid_price(&self) -> f64 {
        (self.best_bid() + self.best_ask()) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.best_ask() - self.best_bid()
    }

    pub fn spread_bps(&self) -> f64 {
        let mid = self.mid_price();
        if mid > 0.0 {
            (self.spread() / mid) * 10_000.0
        } else {
            0.0
        }
    }

    /// True when both sides exist and best bid >= best ask
    pub fn is_crossed(&self) -> bool {
        let bid = self.best_bid();
        let ask = self.best_ask();
        bid > 0.0 && ask > 0.0 && bid >= ask
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn last_update_ns(&self) -> i64 {
        self.last_update_ns
    }

    /// Nanoseconds since the last update
    pub fn age_ns(&self, current_ns: i64) -> i64 {
        (current_ns - self.last_update_ns).max(0)
    }

    /// Owned snapshot for readers outside the handler lock
    pub fn view(&self) -> BookView {
        BookView {
            market_id: self.market_id.clone(),
            bids: self.bids.top(usize::MAX, true, self.last_update_ns),
            asks: self.asks.top(usize::MAX, false, self.last_update_ns),
            sequence: self.sequence,
            last_update_ns: self.last_update_ns,
        }
    }
}

/// Owned, consistent snapshot of one book
///
/// Returned by the handler's reader API; never aliases handler state.
/// `bids` best-first (descending), `asks` best-first (ascending).
#[derive(Debug, Clone, PartialEq)]
pub struct BookView {
    pub market_id: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub sequence: u32,
    pub last_update_ns: i64,
}

impl BookView {
    pub fn best_bid(&self) -> f64 {
        self.bids.first().map(|l| l.price).unwrap_or(0.0)
    }

    pub fn best_ask(&self) -> f64 {
        self.asks.first().map(|l| l.price).unwrap_or(0.0)
    }

    pub fn mid_price(&self) -> f64 {
        (self.best_bid() + self.best_ask()) / 2.0
    }
}
