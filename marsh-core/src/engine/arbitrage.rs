//! Arbitrage Detector
//!
//! Scans per-venue quotes for cross-venue price dislocations on a fixed
//! cadence. For an ordered venue pair `(A, B)` the tradeable edge is
//! `bid_B - ask_A`; both directions are evaluated in full and the
//! direction with the higher profit after fees wins.
//!
//! When only one venue has published a quote for a market, a counterpart
//! quote is synthesized at a configurable premium so single-feed
//! deployments still produce signals. This is an explicit placeholder
//! model; with two or more live venues the scan always runs on real
//! per-venue quotes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::Protocol;
use crate::data::handler::MarketDataHandler;
use crate::data::types::Quote;
use crate::perf::metrics::AtomicF64;
use crate::perf::timing::now_ns;
use crate::utils::run_guarded;

/// Arbitrage opportunity between two venues
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrageOpportunity {
    pub market_id: String,

    pub buy_venue: Protocol,
    pub sell_venue: Protocol,

    /// Price to buy at `buy_venue`
    pub buy_price: f64,
    /// Price to sell at `sell_venue`
    pub sell_price: f64,
    /// Maximum executable size across both legs
    pub max_size: f64,

    /// `sell_price - buy_price`
    pub spread: f64,
    pub spread_bps: f64,
    pub expected_profit: f64,
    pub profit_after_fees: f64,

    pub detected_ns: i64,
    /// Age of the oldest quote used
    pub quote_age_ns: i64,

    /// 1.0 at age zero, 0.0 at the configured max age
    pub confidence: f64,
    pub stale: bool,
}

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageConfig {
    /// Minimum spread to report, in basis points
    pub min_spread_bps: f64,
    /// Minimum profit after fees to report
    pub min_profit: f64,
    /// Quotes older than this flag the opportunity stale
    pub max_quote_age_ns: i64,

    pub kalshi_fee_bps: f64,
    pub polymarket_fee_bps: f64,
    /// Fee applied to venues without a specific entry
    pub default_fee_bps: f64,

    /// Premium applied when synthesizing the counterpart venue for a
    /// single-feed market
    pub synthetic_offset_bps: f64,

    /// Minimum pause between scans
    pub scan_interval: Duration,

    /// Markets to scan; empty means every market the handler knows
    pub tracked_markets: Vec<String>,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            min_spread_bps: 10.0,
            min_profit: 1.0,
            max_quote_age_ns: 100_000_000, // 100ms
            kalshi_fee_bps: 7.0,
            polymarket_fee_bps: 0.0,
            default_fee_bps: 0.0,
            synthetic_offset_bps: 500.0,
            scan_interval: Duration::from_millis(1),
            tracked_markets: Vec::new(),
        }
    }
}

/// Detector statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectorStats {
    pub scans: u64,
    pub opportunities_found: u64,
    pub total_theoretical_profit: f64,
    pub last_scan_ns: i64,
}

type OpportunityCallback = Box<dyn Fn(&ArbitrageOpportunity) + Send + Sync>;
type OpportunityKey = (String, Protocol, Protocol);

struct Shared {
    handler: Arc<MarketDataHandler>,
    config: RwLock<ArbitrageConfig>,
    running: AtomicBool,

    cache: Mutex<HashMap<OpportunityKey, ArbitrageOpportunity>>,
    callback: RwLock<Option<OpportunityCallback>>,

    scans: AtomicU64,
    opportunities_found: AtomicU64,
    total_theoretical_profit: AtomicF64,
    last_scan_ns: AtomicI64,
}

/// Cross-venue arbitrage detector
pub struct ArbitrageDetector {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ArbitrageDetector {
    pub fn new(handler: Arc<MarketDataHandler>, config: ArbitrageConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler,
                config: RwLock::new(config),
                running: AtomicBool::new(false),
                cache: Mutex::new(HashMap::new()),
                callback: RwLock::new(None),
                scans: AtomicU64::new(0),
                opportunities_found: AtomicU64::new(0),
                total_theoretical_profit: AtomicF64::new(0.0),
                last_scan_ns: AtomicI64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the scan thread. No effect when already running.
    pub fn start(&self) {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("arb-detector".to_string())
            .spawn(move || detect_loop(shared))
        {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                info!("Arbitrage detector started");
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                warn!(%err, "Failed to spawn detector thread");
            }
        }
    }

    /// Stop and join the scan thread. No effect on double-stop.
    pub fn stop(&self) {
        if self
            .shared
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        info!("Arbitrage detector stopped");
    }

    /// Check one market now, outside the scan cadence
    pub fn check_market(&self, market_id: &str) -> Vec<ArbitrageOpportunity> {
        check_market(&self.shared, market_id)
    }

    /// Snapshot of all cached opportunities
    pub fn get_opportunities(&self) -> Vec<ArbitrageOpportunity> {
        self.shared.cache.lock().values().cloned().collect()
    }

    /// Cached opportunity with the highest profit after fees
    pub fn get_best_opportunity(&self) -> Option<ArbitrageOpportunity> {
        self.shared
            .cache
            .lock()
            .values()
            .max_by(|a, b| a.profit_after_fees.total_cmp(&b.profit_after_fees))
            .cloned()
    }

    pub fn set_callback(&self, cb: impl Fn(&ArbitrageOpportunity) + Send + Sync + 'static) {
        *self.shared.callback.write() = Some(Box::new(cb));
    }

    pub fn set_config(&self, config: ArbitrageConfig) {
        *self.shared.config.write() = config;
    }

    pub fn config(&self) -> ArbitrageConfig {
        self.shared.config.read().clone()
    }

    /// Stats snapshot; reading has no side effects
    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            scans: self.shared.scans.load(Ordering::Relaxed),
            opportunities_found: self.shared.opportunities_found.load(Ordering::Relaxed),
            total_theoretical_profit: self.shared.total_theoretical_profit.load(),
            last_scan_ns: self.shared.last_scan_ns.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ArbitrageDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn detect_loop(shared: Arc<Shared>) {
    while shared.running.load(Ordering::Acquire) {
        let start = now_ns();
        scan_all_markets(&shared);
        shared.scans.fetch_add(1, Ordering::Relaxed);
        shared.last_scan_ns.store(now_ns() - start, Ordering::Relaxed);

        let interval = shared.config.read().scan_interval;
        thread::sleep(interval);
    }
}

fn scan_all_markets(shared: &Shared) {
    let tracked = shared.config.read().tracked_markets.clone();
    let markets = if tracked.is_empty() {
        shared.handler.get_markets()
    } else {
        tracked
    };

    for market_id in &markets {
        for opportunity in check_market(shared, market_id) {
            process_opportunity(shared, opportunity);
        }
    }

    cleanup_stale(shared);
}

fn check_market(shared: &Shared, market_id: &str) -> Vec<ArbitrageOpportunity> {
    let quotes = shared.handler.get_venue_quotes(market_id);
    if quotes.is_empty() {
        return Vec::new();
    }

    let config = shared.config.read().clone();
    let now = now_ns();
    let mut opportunities = Vec::new();

    if quotes.len() >= 2 {
        // Real cross-venue scan over every unordered venue pair
        for i in 0..quotes.len() {
            for j in (i + 1)..quotes.len() {
                if let Some(opp) = check_pair(&config, market_id, &quotes[i], &quotes[j], now) {
                    opportunities.push(opp);
                }
            }
        }
    } else {
        // Single feed: synthesize the counterpart venue at a premium
        let quote = &quotes[0];
        let synthetic = synthesize_counterpart(quote, config.synthetic_offset_bps);
        if let Some(opp) = check_pair(&config, market_id, quote, &synthetic, now) {
            opportunities.push(opp);
        }
    }

    opportunities
}

fn synthesize_counterpart(quote: &Quote, offset_bps: f64) -> Quote {
    let factor = 1.0 + offset_bps / 10_000.0;
    let venue = if quote.source.is_kalshi() {
        Protocol::PolymarketWs
    } else {
        Protocol::KalshiWs
    };

    Quote {
        market_id: quote.market_id.clone(),
        source: venue,
        bid_price: quote.bid_price * factor,
        bid_size: quote.bid_size,
        ask_price: quote.ask_price * factor,
        ask_size: quote.ask_size,
        timestamp_ns: quote.timestamp_ns,
    }
}

/// Evaluate both directions between two venue quotes and keep the
/// better one by profit after fees, subject to the report thresholds.
fn check_pair(
    config: &ArbitrageConfig,
    market_id: &str,
    a: &Quote,
    b: &Quote,
    now: i64,
) -> Option<ArbitrageOpportunity> {
    let quote_age = a.age_ns(now).max(b.age_ns(now));

    let forward = evaluate_direction(config, market_id, a, b, now, quote_age);
    let reverse = evaluate_direction(config, market_id, b, a, now, quote_age);

    let best = match (forward, reverse) {
        (Some(f), Some(r)) => {
            // Tie-break on profit after fees
            if f.profit_after_fees >= r.profit_after_fees {
                f
            } else {
                r
            }
        }
        (Some(f), None) => f,
        (None, Some(r)) => r,
        (None, None) => return None,
    };

    if best.spread_bps < config.min_spread_bps || best.profit_after_fees < config.min_profit {
        return None;
    }

    Some(best)
}

/// Buy at `buy.ask`, sell at `sell.bid`; `None` when the direction has
/// no positive edge or a leg is missing.
fn evaluate_direction(
    config: &ArbitrageConfig,
    market_id: &str,
    buy: &Quote,
    sell: &Quote,
    now: i64,
    quote_age: i64,
) -> Option<ArbitrageOpportunity> {
    if buy.ask_price <= 0.0 || sell.bid_price <= 0.0 {
        return None;
    }

    let spread = sell.bid_price - buy.ask_price;
    if spread <= 0.0 {
        return None;
    }

    let buy_price = buy.ask_price;
    let sell_price = sell.bid_price;
    let mid_price = (buy_price + sell_price) / 2.0;
    let spread_bps = (spread / mid_price) * 10_000.0;

    let max_size = sell.bid_size.min(buy.ask_size);
    let expected_profit = spread * max_size;

    let fee_buy = venue_fee(config, buy.source) * buy_price * max_size / 10_000.0;
    let fee_sell = venue_fee(config, sell.source) * sell_price * max_size / 10_000.0;
    let profit_after_fees = expected_profit - fee_buy - fee_sell;

    let confidence = (1.0 - quote_age as f64 / config.max_quote_age_ns as f64).max(0.0);

    Some(ArbitrageOpportunity {
        market_id: market_id.to_string(),
        buy_venue: buy.source,
        sell_venue: sell.source,
        buy_price,
        sell_price,
        max_size,
        spread,
        spread_bps,
        expected_profit,
        profit_after_fees,
        detected_ns: now,
        quote_age_ns: quote_age,
        confidence,
        stale: quote_age > config.max_quote_age_ns,
    })
}

fn venue_fee(config: &ArbitrageConfig, venue: Protocol) -> f64 {
    if venue.is_kalshi() {
        config.kalshi_fee_bps
    } else if venue.is_polymarket() {
        config.polymarket_fee_bps
    } else {
        config.default_fee_bps
    }
}

fn process_opportunity(shared: &Shared, opportunity: ArbitrageOpportunity) {
    let key = (
        opportunity.market_id.clone(),
        opportunity.buy_venue,
        opportunity.sell_venue,
    );

    {
        let mut cache = shared.cache.lock();
        let is_new = !cache.contains_key(&key);
        if is_new {
            shared.opportunities_found.fetch_add(1, Ordering::Relaxed);
            shared
                .total_theoretical_profit
                .fetch_add(opportunity.profit_after_fees);
            debug!(
                market = %opportunity.market_id,
                buy = %opportunity.buy_venue,
                sell = %opportunity.sell_venue,
                spread_bps = opportunity.spread_bps,
                profit = opportunity.profit_after_fees,
                "New arbitrage opportunity"
            );
        }
        cache.insert(key, opportunity.clone());
    }

    // Fires for every opportunity on every scan, not just new keys
    let callback = shared.callback.read();
    if let Some(cb) = callback.as_ref() {
        run_guarded("opportunity_callback", || cb(&opportunity));
    }
}

fn cleanup_stale(shared: &Shared) {
    let max_age = shared.config.read().max_quote_age_ns;
    let now = now_ns();
    shared
        .cache
        .lock()
        .retain(|_, opp| now - opp.detected_ns <= max_age.saturating_mul(10));
}
