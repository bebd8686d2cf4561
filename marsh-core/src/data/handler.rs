//! Market Data Handler
//!
//! Receives normalized messages, maintains quote and book state, and
//! serves readers without blocking the feed. One dedicated worker thread
//! (optionally pinned) pops an MPSC ring and applies updates; readers
//! observe through shared read locks and owned snapshots.
//!
//! Inbound is deliberately lossy: when the ring is full the message is
//! dropped and counted. Market data is replaceable by nature and a
//! stalled handler must not stall the parser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::queue::{mpsc, MpscConsumer, MpscProducer};
use crate::core::{ConfigError, Protocol};
use crate::data::types::{
    MarketDataUpdate, NormalizedMessage, OrderBookSnapshot, OrderFill, Quote, TradeEvent,
};
use crate::orderbook::{BookView, OrderBook};
use crate::perf::metrics::EmaNanos;
use crate::perf::timing::now_ns;
use crate::utils::run_guarded;

/// Handler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// CPU core for the worker thread (-1 = no pinning)
    pub handler_thread_core: i32,

    /// Inbound ring capacity (power of two)
    pub update_queue_size: usize,

    /// Maintain full depth books in addition to top-of-book quotes
    pub maintain_full_books: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            handler_thread_core: -1,
            update_queue_size: 65_536,
            maintain_full_books: true,
        }
    }
}

/// Handler statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStats {
    pub quotes_received: u64,
    pub trades_received: u64,
    pub books_received: u64,
    pub queue_drops: u64,
    pub avg_processing_latency_ns: i64,
}

type QuoteCallback = Box<dyn Fn(&Quote) + Send + Sync>;
type TradeCallback = Box<dyn Fn(&TradeEvent) + Send + Sync>;
type BookCallback = Box<dyn Fn(&str, &BookView) + Send + Sync>;
type FillCallback = Box<dyn Fn(&OrderFill) + Send + Sync>;

struct Shared {
    config: HandlerConfig,
    running: AtomicBool,

    // Latest quote per market, plus the per-(market, venue) map the
    // cross-venue scan operates on
    quotes: RwLock<HashMap<String, Quote>>,
    venue_quotes: RwLock<HashMap<(String, Protocol), Quote>>,
    books: RwLock<HashMap<String, OrderBook>>,

    quote_callback: RwLock<Option<QuoteCallback>>,
    trade_callback: RwLock<Option<TradeCallback>>,
    book_callback: RwLock<Option<BookCallback>>,
    fill_callback: RwLock<Option<FillCallback>>,

    quotes_received: AtomicU64,
    trades_received: AtomicU64,
    books_received: AtomicU64,
    queue_drops: AtomicU64,
    avg_processing_latency: EmaNanos,
}

/// Market data handler with a dedicated processing thread
pub struct MarketDataHandler {
    shared: Arc<Shared>,
    producer: MpscProducer<NormalizedMessage>,
    consumer: Mutex<Option<MpscConsumer<NormalizedMessage>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MarketDataHandler {
    /// Build a handler. Fails if the queue capacity is not a positive
    /// power of two or the worker core is out of range for this host.
    pub fn with_config(config: HandlerConfig) -> Result<Self, ConfigError> {
        if config.handler_thread_core >= 0 {
            crate::perf::cpu::validate_core(config.handler_thread_core as usize)?;
        }
        let (producer, consumer) = mpsc::channel(config.update_queue_size)?;

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                running: AtomicBool::new(false),
                quotes: RwLock::new(HashMap::new()),
                venue_quotes: RwLock::new(HashMap::new()),
                books: RwLock::new(HashMap::new()),
                quote_callback: RwLock::new(None),
                trade_callback: RwLock::new(None),
                book_callback: RwLock::new(None),
                fill_callback: RwLock::new(None),
                quotes_received: AtomicU64::new(0),
                trades_received: AtomicU64::new(0),
                books_received: AtomicU64::new(0),
                queue_drops: AtomicU64::new(0),
                avg_processing_latency: EmaNanos::new(),
            }),
            producer,
            consumer: Mutex::new(Some(consumer)),
            worker: Mutex::new(None),
        })
    }

    /// Build with the default configuration (valid by construction)
    pub fn new(config: HandlerConfig) -> Self {
        match Self::with_config(config.clone()) {
            Ok(handler) => handler,
            Err(err) => {
                warn!(%err, "Invalid handler config, falling back to defaults");
                Self::with_config(HandlerConfig {
                    update_queue_size: HandlerConfig::default().update_queue_size,
                    handler_thread_core: -1,
                    ..config
                })
                .unwrap_or_else(|_| unreachable!("default handler config is valid"))
            }
        }
    }

    /// Start the worker thread. No effect if already running or already
    /// stopped (once-only lifecycle).
    pub fn start(&self) {
        let mut consumer_slot = self.consumer.lock();

        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return; // Already running
        }

        let consumer = match consumer_slot.take() {
            Some(consumer) => consumer,
            None => {
                // start() after stop(): once-only lifecycle
                self.shared.running.store(false, Ordering::Release);
                warn!("Handler start() after stop() has no effect");
                return;
            }
        };

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("md-handler".to_string())
            .spawn(move || process_loop(shared, consumer))
        {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                info!("Market data handler started");
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                warn!(%err, "Failed to spawn handler thread");
            }
        }
    }

    /// Stop and join the worker. No effect on double-stop.
    pub fn stop(&self) {
        if self
            .shared
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return; // Not running
        }

        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        info!("Market data handler stopped");
    }

    /// Feed a normalized message. Full queue drops the message and
    /// increments `queue_drops`; there is no backpressure upstream.
    pub fn on_message(&self, msg: NormalizedMessage) {
        if !self.producer.try_push(msg) {
            self.shared.queue_drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Latest quote for a market, regardless of venue
    pub fn get_quote(&self, market_id: &str) -> Option<Quote> {
        self.shared.quotes.read().get(market_id).cloned()
    }

    /// Quote for a specific (market, venue) pair
    pub fn get_venue_quote(&self, market_id: &str, venue: Protocol) -> Option<Quote> {
        self.shared
            .venue_quotes
            .read()
            .get(&(market_id.to_string(), venue))
            .cloned()
    }

    /// All per-venue quotes known for a market
    pub fn get_venue_quotes(&self, market_id: &str) -> Vec<Quote> {
        self.shared
            .venue_quotes
            .read()
            .iter()
            .filter(|((id, _), _)| id == market_id)
            .map(|(_, quote)| quote.clone())
            .collect()
    }

    /// Owned snapshot of a market's book
    pub fn get_book(&self, market_id: &str) -> Option<BookView> {
        self.shared.books.read().get(market_id).map(OrderBook::view)
    }

    /// All market ids with a current quote
    pub fn get_markets(&self) -> Vec<String> {
        self.shared.quotes.read().keys().cloned().collect()
    }

    pub fn set_quote_callback(&self, cb: impl Fn(&Quote) + Send + Sync + 'static) {
        *self.shared.quote_callback.write() = Some(Box::new(cb));
    }

    pub fn set_trade_callback(&self, cb: impl Fn(&TradeEvent) + Send + Sync + 'static) {
        *self.shared.trade_callback.write() = Some(Box::new(cb));
    }

    pub fn set_book_callback(&self, cb: impl Fn(&str, &BookView) + Send + Sync + 'static) {
        *self.shared.book_callback.write() = Some(Box::new(cb));
    }

    /// Bridge for venue fills arriving through the market-data path
    pub fn set_fill_callback(&self, cb: impl Fn(&OrderFill) + Send + Sync + 'static) {
        *self.shared.fill_callback.write() = Some(Box::new(cb));
    }

    /// Stats snapshot; reading has no side effects
    pub fn stats(&self) -> HandlerStats {
        HandlerStats {
            quotes_received: self.shared.quotes_received.load(Ordering::Relaxed),
            trades_received: self.shared.trades_received.load(Ordering::Relaxed),
            books_received: self.shared.books_received.load(Ordering::Relaxed),
            queue_drops: self.shared.queue_drops.load(Ordering::Relaxed),
            avg_processing_latency_ns: self.shared.avg_processing_latency.get(),
        }
    }
}

impl Drop for MarketDataHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn process_loop(shared: Arc<Shared>, consumer: MpscConsumer<NormalizedMessage>) {
    let core = shared.config.handler_thread_core;
    if core >= 0 {
        crate::perf::cpu::pin_to_core(core as usize);
    }

    while shared.running.load(Ordering::Acquire) {
        let msg = match consumer.try_pop() {
            Some(msg) => msg,
            None => {
                thread::yield_now();
                continue;
            }
        };

        let start = now_ns();
        match msg {
            NormalizedMessage::MarketData(update) => handle_quote(&shared, update),
            NormalizedMessage::BookSnapshot(snapshot) => handle_book(&shared, snapshot),
            NormalizedMessage::Trade(trade) => handle_trade(&shared, trade),
            NormalizedMessage::Fill(fill) => handle_fill(&shared, fill),
        }
        shared.avg_processing_latency.update(now_ns() - start);
    }
}

fn handle_quote(shared: &Shared, update: MarketDataUpdate) {
    let quote = Quote::from(&update);

    // Exclusive locks held only for the upserts
    {
        let mut quotes = shared.quotes.write();
        quotes.insert(update.market_id.clone(), quote.clone());
    }
    {
        let mut venue_quotes = shared.venue_quotes.write();
        venue_quotes.insert((update.market_id.clone(), update.source), quote.clone());
    }

    shared.quotes_received.fetch_add(1, Ordering::Relaxed);

    let callback = shared.quote_callback.read();
    if let Some(cb) = callback.as_ref() {
        run_guarded("quote_callback", || cb(&quote));
    }
}

fn handle_book(shared: &Shared, snapshot: OrderBookSnapshot) {
    if !shared.config.maintain_full_books {
        return;
    }

    let view = {
        let mut books = shared.books.write();
        let book = books
            .entry(snapshot.market_id.clone())
            .or_insert_with(|| OrderBook::new(snapshot.market_id.clone()));
        book.apply(&snapshot);
        book.view()
    };

    shared.books_received.fetch_add(1, Ordering::Relaxed);

    let callback = shared.book_callback.read();
    if let Some(cb) = callback.as_ref() {
        run_guarded("book_callback", || cb(&snapshot.market_id, &view));
    }
}

fn handle_trade(shared: &Shared, trade: TradeEvent) {
    shared.trades_received.fetch_add(1, Ordering::Relaxed);

    let callback = shared.trade_callback.read();
    if let Some(cb) = callback.as_ref() {
        run_guarded("trade_callback", || cb(&trade));
    }
}

fn handle_fill(shared: &Shared, fill: OrderFill) {
    let callback = shared.fill_callback.read();
    if let Some(cb) = callback.as_ref() {
        run_guarded("fill_callback", || cb(&fill));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Side;
    use crate::data::types::BookLevel;
    use crate::testing::wait_until;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn update(market: &str, venue: Protocol, bid: f64, ask: f64) -> NormalizedMessage {
        NormalizedMessage::MarketData(MarketDataUpdate {
            source: venue,
            market_id: market.to_string(),
            symbol: String::new(),
            bid_price: bid,
            ask_price: ask,
            bid_size: 1000.0,
            ask_size: 1000.0,
            last_price: 0.0,
            volume_24h: 0.0,
            timestamp_ns: now_ns(),
            sequence: 1,
        })
    }

    #[test]
    fn test_quote_becomes_visible_after_processing() {
        let handler = MarketDataHandler::new(HandlerConfig::default());
        handler.start();

        handler.on_message(update("M1", Protocol::KalshiWs, 0.50, 0.52));

        assert!(wait_until(Duration::from_secs(2), || handler
            .get_quote("M1")
            .is_some()));

        let quote = handler.get_quote("M1").unwrap();
        assert_eq!(quote.bid_price, 0.50);
        assert_eq!(quote.ask_price, 0.52);
        assert_eq!(quote.source, Protocol::KalshiWs);

        assert_eq!(handler.stats().quotes_received, 1);
        handler.stop();
    }

    #[test]
    fn test_per_venue_quotes_tracked_separately() {
        let handler = MarketDataHandler::new(HandlerConfig::default());
        handler.start();

        handler.on_message(update("M1", Protocol::KalshiWs, 0.50, 0.52));
        handler.on_message(update("M1", Protocol::PolymarketWs, 0.53, 0.55));

        assert!(wait_until(Duration::from_secs(2), || handler
            .get_venue_quotes("M1")
            .len()
            == 2));

        let kalshi = handler.get_venue_quote("M1", Protocol::KalshiWs).unwrap();
        let poly = handler
            .get_venue_quote("M1", Protocol::PolymarketWs)
            .unwrap();
        assert_eq!(kalshi.ask_price, 0.52);
        assert_eq!(poly.bid_price, 0.53);

        // Latest-quote map holds the most recent arrival
        let latest = handler.get_quote("M1").unwrap();
        assert_eq!(latest.source, Protocol::PolymarketWs);

        handler.stop();
    }

    #[test]
    fn test_queue_full_drops_are_counted() {
        // Worker intentionally not started: the ring fills up
        let handler = MarketDataHandler::new(HandlerConfig {
            update_queue_size: 16,
            ..HandlerConfig::default()
        });

        let total = 50u64;
        for i in 0..total {
            handler.on_message(update(&format!("M{}", i), Protocol::KalshiWs, 0.5, 0.52));
        }

        let drops = handler.stats().queue_drops;
        assert!(
            drops >= total - 16,
            "expected at least {} drops, got {}",
            total - 16,
            drops
        );

        // Unblocking the worker drains the buffered messages
        handler.start();
        assert!(wait_until(Duration::from_secs(2), || {
            handler.stats().quotes_received == total - drops
        }));
        handler.stop();
    }

    #[test]
    fn test_book_snapshot_maintained() {
        let handler = MarketDataHandler::new(HandlerConfig::default());
        handler.start();

        handler.on_message(NormalizedMessage::BookSnapshot(OrderBookSnapshot {
            source: Protocol::KalshiWs,
            market_id: "M1".to_string(),
            bids: vec![BookLevel {
                price: 0.50,
                size: 100.0,
                timestamp_ns: 0,
            }],
            asks: vec![BookLevel {
                price: 0.52,
                size: 150.0,
                timestamp_ns: 0,
            }],
            timestamp_ns: now_ns(),
            sequence: 9,
        }));

        assert!(wait_until(Duration::from_secs(2), || handler
            .get_book("M1")
            .is_some()));

        let view = handler.get_book("M1").unwrap();
        assert_eq!(view.best_bid(), 0.50);
        assert_eq!(view.best_ask(), 0.52);
        assert_eq!(view.sequence, 9);
        assert_eq!(handler.stats().books_received, 1);

        handler.stop();
    }

    #[test]
    fn test_books_disabled_by_config() {
        let handler = MarketDataHandler::new(HandlerConfig {
            maintain_full_books: false,
            ..HandlerConfig::default()
        });
        handler.start();

        handler.on_message(NormalizedMessage::BookSnapshot(OrderBookSnapshot {
            source: Protocol::KalshiWs,
            market_id: "M1".to_string(),
            bids: vec![],
            asks: vec![],
            timestamp_ns: now_ns(),
            sequence: 1,
        }));
        // Quotes still flow; use one as the completion signal
        handler.on_message(update("M2", Protocol::KalshiWs, 0.5, 0.52));

        assert!(wait_until(Duration::from_secs(2), || handler
            .get_quote("M2")
            .is_some()));
        assert!(handler.get_book("M1").is_none());
        assert_eq!(handler.stats().books_received, 0);

        handler.stop();
    }

    #[test]
    fn test_trade_callback_fires() {
        let handler = Arc::new(MarketDataHandler::new(HandlerConfig::default()));
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_cb = Arc::clone(&seen);
        handler.set_trade_callback(move |trade| {
            assert_eq!(trade.market_id, "M1");
            seen_cb.fetch_add(1, Ordering::SeqCst);
        });

        handler.start();
        handler.on_message(NormalizedMessage::Trade(TradeEvent {
            source: Protocol::KalshiWs,
            market_id: "M1".to_string(),
            trade_id: "7".to_string(),
            aggressor_side: Side::Buy,
            price: 0.51,
            size: 10.0,
            timestamp_ns: now_ns(),
        }));

        assert!(wait_until(Duration::from_secs(2), || seen
            .load(Ordering::SeqCst)
            == 1));
        assert_eq!(handler.stats().trades_received, 1);
        handler.stop();
    }

    #[test]
    fn test_panicking_callback_does_not_kill_worker() {
        let handler = Arc::new(MarketDataHandler::new(HandlerConfig::default()));
        handler.set_quote_callback(|_| panic!("user callback bug"));
        handler.start();

        handler.on_message(update("M1", Protocol::KalshiWs, 0.50, 0.52));
        handler.on_message(update("M2", Protocol::KalshiWs, 0.60, 0.62));

        // Both messages processed despite the first callback panicking
        assert!(wait_until(Duration::from_secs(2), || handler
            .stats()
            .quotes_received
            == 2));
        handler.stop();
    }

    #[test]
    fn test_lifecycle_is_once_only() {
        let handler = MarketDataHandler::new(HandlerConfig::default());
        handler.start();
        handler.start(); // Double-start: no effect
        handler.stop();
        handler.stop(); // Double-stop: no effect
        handler.start(); // Start after stop: no effect

        handler.on_message(update("M1", Protocol::KalshiWs, 0.50, 0.52));
        std::thread::sleep(Duration::from_millis(50));
        assert!(handler.get_quote("M1").is_none(), "worker must not be running");
    }

    #[test]
    fn test_invalid_queue_size_falls_back() {
        let handler = MarketDataHandler::new(HandlerConfig {
            update_queue_size: 1000, // Not a power of two
            ..HandlerConfig::default()
        });
        // Falls back to the default capacity rather than panicking
        handler.on_message(update("M1", Protocol::KalshiWs, 0.5, 0.52));
        assert_eq!(handler.stats().queue_drops, 0);
    }

    #[test]
    fn test_with_config_rejects_bad_capacity() {
        assert!(matches!(
            MarketDataHandler::with_config(HandlerConfig {
                update_queue_size: 1000,
                ..HandlerConfig::default()
            }),
            Err(ConfigError::InvalidCapacity { .. })
        ));
    }

    #[test]
    fn test_with_config_rejects_out_of_range_core() {
        assert!(matches!(
            MarketDataHandler::with_config(HandlerConfig {
                handler_thread_core: i32::MAX,
                ..HandlerConfig::default()
            }),
            Err(ConfigError::InvalidCore { .. })
        ));

        // -1 means no pinning and is always valid
        assert!(MarketDataHandler::with_config(HandlerConfig {
            handler_thread_core: -1,
            ..HandlerConfig::default()
        })
        .is_ok());
    }

    #[test]
    fn test_get_markets_lists_quote_keys() {
        let handler = MarketDataHandler::new(HandlerConfig::default());
        handler.start();

        handler.on_message(update("M1", Protocol::KalshiWs, 0.5, 0.52));
        handler.on_message(update("M2", Protocol::KalshiWs, 0.6, 0.62));

        assert!(wait_until(Duration::from_secs(2), || handler
            .get_markets()
            .len()
            == 2));

        let mut markets = handler.get_markets();
        markets.sort();
        assert_eq!(markets, vec!["M1".to_string(), "M2".to_string()]);
        handler.stop();
    }
}
