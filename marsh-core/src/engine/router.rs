//! Order Router
//!
//! Venue-selection policy over the execution engine and market data.
//! Five strategies; `Smart` scores every known venue as
//! `w_latency * latency_score + w_fill * fill_score + w_price * price_score`
//! with each score max-scaled to [0, 1] and missing data defaulting to a
//! neutral 0.5.
//!
//! Venue statistics accumulate through `record_execution`: latency as a
//! 7/8-weighted EMA, p99 as a running max, and fill/reject rates from
//! plain counters.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Protocol, Side};
use crate::data::handler::MarketDataHandler;
use crate::execution::engine::ExecutionEngine;
use crate::execution::types::OrderRequest;
use crate::perf::timing::now_ns;

/// Per-venue routing statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VenueStats {
    pub venue: Protocol,
    pub avg_latency_ns: i64,
    pub p99_latency_ns: i64,
    /// Fraction of orders filled
    pub fill_rate: f64,
    /// Fraction of orders rejected
    pub reject_rate: f64,
    pub available_liquidity: f64,
    pub last_update_ns: i64,
}

impl VenueStats {
    fn empty(venue: Protocol) -> Self {
        Self {
            venue,
            avg_latency_ns: 0,
            p99_latency_ns: 0,
            fill_rate: 0.0,
            reject_rate: 0.0,
            available_liquidity: 0.0,
            last_update_ns: 0,
        }
    }
}

/// Routing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingStrategy {
    /// Route to the venue with the best price
    BestPrice,
    /// Route to the venue with the lowest average latency
    LowestLatency,
    /// Route to the venue with the highest fill rate
    BestFillRate,
    /// Split evenly across known venues
    Split,
    /// Weighted combination of latency, fill rate, and price
    Smart,
}

/// Routing decision
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub primary_venue: Protocol,
    /// `(venue, quantity fraction)` pairs; fractions sum to 1
    pub venue_splits: Vec<(Protocol, f64)>,
    pub reason: String,
}

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub default_strategy: RoutingStrategy,
    /// Split legs below this quantity are dropped before submission
    pub min_split_size: f64,
    pub latency_weight: f64,
    pub price_weight: f64,
    pub fill_rate_weight: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_strategy: RoutingStrategy::Smart,
            min_split_size: 100.0,
            latency_weight: 0.3,
            price_weight: 0.4,
            fill_rate_weight: 0.3,
        }
    }
}

struct VenueCounters {
    total: u64,
    filled: u64,
    rejected: u64,
}

/// Multi-venue order router
pub struct OrderRouter {
    engine: Arc<ExecutionEngine>,
    handler: Arc<MarketDataHandler>,
    config: RouterConfig,

    venue_stats: Mutex<HashMap<Protocol, VenueStats>>,
    counters: Mutex<HashMap<Protocol, VenueCounters>>,
}

impl OrderRouter {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        handler: Arc<MarketDataHandler>,
        config: RouterConfig,
    ) -> Self {
        Self {
            engine,
            handler,
            config,
            venue_stats: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Route with the configured default strategy
    pub fn route_order(&self, request: OrderRequest) -> bool {
        self.route_order_with(request, self.config.default_strategy)
    }

    /// Route with an explicit strategy
    ///
    /// Splits below `min_split_size` are dropped before submission.
    /// Returns `true` only if every submitted leg was accepted.
    pub fn route_order_with(&self, request: OrderRequest, strategy: RoutingStrategy) -> bool {
        let decision = self.make_routing_decision(&request, strategy);
        debug!(
            market = %request.market_id,
            primary = %decision.primary_venue,
            legs = decision.venue_splits.len(),
            reason = %decision.reason,
            "Routing order"
        );

        if decision.venue_splits.len() <= 1 {
            let mut routed = request;
            routed.venue = decision.primary_venue;
            return self.engine.submit_order(routed);
        }

        let mut success = true;
        for (venue, fraction) in &decision.venue_splits {
            let mut leg = request.clone();
            leg.venue = *venue;
            leg.quantity = request.quantity * fraction;

            if leg.quantity >= self.config.min_split_size {
                success &= self.engine.submit_order(leg);
            }
        }
        success
    }

    /// Compute a decision without executing it
    pub fn make_routing_decision(
        &self,
        request: &OrderRequest,
        strategy: RoutingStrategy,
    ) -> RoutingDecision {
        match strategy {
            RoutingStrategy::BestPrice => self.route_by_price(request),
            RoutingStrategy::LowestLatency => self.route_by_latency(request),
            RoutingStrategy::BestFillRate => self.route_by_fill_rate(request),
            RoutingStrategy::Split => self.route_split(request),
            RoutingStrategy::Smart => self.route_smart(request),
        }
    }

    /// Fold one execution outcome into the venue's statistics
    pub fn record_execution(&self, venue: Protocol, latency_ns: i64, filled: bool, rejected: bool) {
        let mut counters = self.counters.lock();
        let counter = counters.entry(venue).or_insert(VenueCounters {
            total: 0,
            filled: 0,
            rejected: 0,
        });
        counter.total += 1;
        if filled {
            counter.filled += 1;
        }
        if rejected {
            counter.rejected += 1;
        }
        let (total, filled_n, rejected_n) = (counter.total, counter.filled, counter.rejected);
        drop(counters);

        let mut stats = self.venue_stats.lock();
        let entry = stats.entry(venue).or_insert_with(|| VenueStats::empty(venue));
        entry.avg_latency_ns = (entry.avg_latency_ns * 7 + latency_ns) / 8;
        if latency_ns > entry.p99_latency_ns {
            entry.p99_latency_ns = latency_ns;
        }
        entry.fill_rate = filled_n as f64 / total as f64;
        entry.reject_rate = rejected_n as f64 / total as f64;
        entry.last_update_ns = now_ns();
    }

    /// Replace a venue's statistics wholesale
    pub fn update_venue_stats(&self, venue: Protocol, stats: VenueStats) {
        self.venue_stats.lock().insert(venue, stats);
    }

    pub fn get_venue_stats(&self, venue: Protocol) -> Option<VenueStats> {
        self.venue_stats.lock().get(&venue).copied()
    }

    fn route_by_price(&self, request: &OrderRequest) -> RoutingDecision {
        let quotes = self.handler.get_venue_quotes(&request.market_id);

        let mut best: Option<(Protocol, f64)> = None;
        for quote in &quotes {
            let price = match request.side {
                Side::Buy => quote.ask_price,
                Side::Sell => quote.bid_price,
            };
            if price <= 0.0 {
                continue;
            }

            let better = match (&best, request.side) {
                (None, _) => true,
                (Some((_, current)), Side::Buy) => price < *current,
                (Some((_, current)), Side::Sell) => price > *current,
            };
            if better {
                best = Some((quote.source, price));
            }
        }

        let primary = best.map(|(venue, _)| venue).unwrap_or(request.venue);
        RoutingDecision {
            primary_venue: primary,
            venue_splits: vec![(primary, 1.0)],
            reason: "Best price at venue".to_string(),
        }
    }

    fn route_by_latency(&self, request: &OrderRequest) -> RoutingDecision {
        let stats = self.venue_stats.lock();
        let primary = stats
            .values()
            .min_by_key(|s| s.avg_latency_ns)
            .map(|s| s.venue)
            .unwrap_or(request.venue);

        RoutingDecision {
            primary_venue: primary,
            venue_splits: vec![(primary, 1.0)],
            reason: "Lowest latency venue".to_string(),
        }
    }

    fn route_by_fill_rate(&self, request: &OrderRequest) -> RoutingDecision {
        let stats = self.venue_stats.lock();
        let primary = stats
            .values()
            .max_by(|a, b| a.fill_rate.total_cmp(&b.fill_rate))
            .map(|s| s.venue)
            .unwrap_or(request.venue);

        RoutingDecision {
            primary_venue: primary,
            venue_splits: vec![(primary, 1.0)],
            reason: "Best fill rate venue".to_string(),
        }
    }

    fn route_split(&self, request: &OrderRequest) -> RoutingDecision {
        let stats = self.venue_stats.lock();
        if stats.is_empty() {
            return RoutingDecision {
                primary_venue: request.venue,
                venue_splits: vec![(request.venue, 1.0)],
                reason: "No venues known, single leg".to_string(),
            };
        }

        let fraction = 1.0 / stats.len() as f64;
        let venue_splits: Vec<_> = stats.keys().map(|&venue| (venue, fraction)).collect();

        RoutingDecision {
            primary_venue: venue_splits[0].0,
            venue_splits,
            reason: "Even split across venues".to_string(),
        }
    }

    fn route_smart(&self, request: &OrderRequest) -> RoutingDecision {
        let stats = self.venue_stats.lock();
        if stats.is_empty() {
            return RoutingDecision {
                primary_venue: request.venue,
                venue_splits: vec![(request.venue, 1.0)],
                reason: "No venue stats available".to_string(),
            };
        }

        let max_latency = stats
            .values()
            .map(|s| s.avg_latency_ns as f64)
            .fold(0.0, f64::max);
        let max_fill = stats.values().map(|s| s.fill_rate).fold(0.0, f64::max);

        let mut scored: Vec<(Protocol, f64)> = stats
            .values()
            .map(|s| {
                let latency_score = if max_latency > 0.0 {
                    1.0 - s.avg_latency_ns as f64 / max_latency
                } else {
                    0.5
                };
                let fill_score = if max_fill > 0.0 {
                    s.fill_rate / max_fill
                } else {
                    0.5
                };
                let price_score = self.price_score(request, s.venue);

                let total = self.config.latency_weight * latency_score
                    + self.config.fill_rate_weight * fill_score
                    + self.config.price_weight * price_score;
                (s.venue, total)
            })
            .collect();
        drop(stats);

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        let primary = scored[0].0;

        RoutingDecision {
            primary_venue: primary,
            venue_splits: vec![(primary, 1.0)],
            reason: "Smart routing based on combined metrics".to_string(),
        }
    }

    /// Price score max-scaled to [0, 1] from the per-venue quote map,
    /// mirroring the latency and fill scores: buys score
    /// `1 - ask / max_ask`, sells score `bid / max_bid`. Neutral 0.5
    /// when the venue has no quote for the market.
    fn price_score(&self, request: &OrderRequest, venue: Protocol) -> f64 {
        let quotes = self.handler.get_venue_quotes(&request.market_id);
        let venue_quote = quotes.iter().find(|q| q.source == venue);

        let quote = match venue_quote {
            Some(quote) => quote,
            None => return 0.5,
        };

        match request.side {
            Side::Buy => {
                let venue_ask = quote.ask_price;
                let max_ask = quotes.iter().map(|q| q.ask_price).fold(0.0, f64::max);
                if venue_ask > 0.0 && max_ask > 0.0 {
                    1.0 - venue_ask / max_ask
                } else {
                    0.5
                }
            }
            Side::Sell => {
                let venue_bid = quote.bid_price;
                let max_bid = quotes.iter().map(|q| q.bid_price).fold(0.0, f64::max);
                if venue_bid > 0.0 && max_bid > 0.0 {
                    venue_bid / max_bid
                } else {
                    0.5
                }
            }
        }
    }
}
