//! Execution Engine
//!
//! Two dedicated workers around two rings:
//!
//! - **Order thread** (optionally pinned): pops accepted orders off the
//!   MPSC inbound ring, stamps them `Submitted`, indexes them, encodes
//!   and sends to the venue connection when it is `Connected`.
//! - **Report thread**: pops venue reports off an SPSC ring and applies
//!   them to order state, stats, and positions; per-order callbacks fire
//!   here and are evicted at terminal status.
//!
//! An order submitted via `submit_order` becomes visible to `get_order`
//! only after the order thread consumes it: bounded visibility delay,
//! not instantaneous consistency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::queue::{mpsc, spsc, MpscConsumer, MpscProducer, SpscConsumer, SpscProducer};
use crate::core::{ConfigError, Protocol, Side};
use crate::execution::types::{
    ExecutionReport, JsonOrderEncoder, Order, OrderEncoder, OrderRequest, OrderStatus,
    ReportCallback,
};
use crate::net::connection::{ConnectionState, MarketConnection};
use crate::perf::metrics::{AtomicF64, EmaNanos};
use crate::perf::timing::now_ns;
use crate::risk::{PositionTracker, RiskLimits, RiskManager};
use crate::utils::run_guarded;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// CPU core for the order thread (-1 = no pinning)
    pub order_thread_core: i32,
    /// CPU core for the report thread (-1 = no pinning)
    pub report_thread_core: i32,
    /// Inbound order ring capacity (power of two)
    pub order_queue_size: usize,
    /// Execution report ring capacity (power of two)
    pub report_queue_size: usize,
    pub risk_limits: RiskLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_thread_core: -1,
            report_thread_core: -1,
            order_queue_size: 16_384,
            report_queue_size: 16_384,
            risk_limits: RiskLimits::default(),
        }
    }
}

/// Engine statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineStats {
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub orders_rejected: u64,
    pub total_volume: f64,
    /// EMA of submit latency (created -> picked up by the order thread)
    pub avg_latency_ns: i64,
}

type OrderCallback = Box<dyn Fn(&Order) + Send + Sync>;
type ExecutionCallback = Box<dyn Fn(&ExecutionReport) + Send + Sync>;

struct Shared {
    config: EngineConfig,
    running: AtomicBool,
    next_order_id: AtomicU64,

    risk: RiskManager,
    positions: PositionTracker,

    active_orders: Mutex<HashMap<u64, Order>>,
    callbacks: Mutex<HashMap<u64, ReportCallback>>,

    connections: Mutex<HashMap<Protocol, Arc<dyn MarketConnection>>>,
    encoders: Mutex<HashMap<Protocol, Box<dyn OrderEncoder>>>,
    default_encoder: JsonOrderEncoder,

    order_callback: RwLock<Option<OrderCallback>>,
    execution_callback: RwLock<Option<ExecutionCallback>>,

    orders_submitted: AtomicU64,
    orders_filled: AtomicU64,
    orders_rejected: AtomicU64,
    total_volume: AtomicF64,
    avg_latency: EmaNanos,
}

/// Low-latency order execution engine
pub struct ExecutionEngine {
    shared: Arc<Shared>,

    order_tx: MpscProducer<Order>,
    order_rx: Mutex<Option<MpscConsumer<Order>>>,
    report_tx: Mutex<Option<SpscProducer<ExecutionReport>>>,
    report_rx: Mutex<Option<SpscConsumer<ExecutionReport>>>,

    order_worker: Mutex<Option<JoinHandle<()>>>,
    report_worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionEngine {
    /// Build an engine. Fails if a queue capacity is not a positive
    /// power of two or a worker core is out of range for this host.
    pub fn with_config(config: EngineConfig) -> Result<Self, ConfigError> {
        for core in [config.order_thread_core, config.report_thread_core] {
            if core >= 0 {
                crate::perf::cpu::validate_core(core as usize)?;
            }
        }
        let (order_tx, order_rx) = mpsc::channel(config.order_queue_size)?;
        let (report_tx, report_rx) = spsc::channel(config.report_queue_size)?;

        let shared = Arc::new(Shared {
            risk: RiskManager::new(config.risk_limits.clone()),
            config,
            running: AtomicBool::new(false),
            next_order_id: AtomicU64::new(1),
            positions: PositionTracker::new(),
            active_orders: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            encoders: Mutex::new(HashMap::new()),
            default_encoder: JsonOrderEncoder,
            order_callback: RwLock::new(None),
            execution_callback: RwLock::new(None),
            orders_submitted: AtomicU64::new(0),
            orders_filled: AtomicU64::new(0),
            orders_rejected: AtomicU64::new(0),
            total_volume: AtomicF64::new(0.0),
            avg_latency: EmaNanos::new(),
        });

        Ok(Self {
            shared,
            order_tx,
            order_rx: Mutex::new(Some(order_rx)),
            report_tx: Mutex::new(Some(report_tx)),
            report_rx: Mutex::new(Some(report_rx)),
            order_worker: Mutex::new(None),
            report_worker: Mutex::new(None),
        })
    }

    /// Build with queue sizes falling back to defaults when invalid
    pub fn new(config: EngineConfig) -> Self {
        match Self::with_config(config.clone()) {
            Ok(engine) => engine,
            Err(err) => {
                warn!(%err, "Invalid engine config, falling back to defaults");
                Self::with_config(EngineConfig {
                    order_queue_size: EngineConfig::default().order_queue_size,
                    report_queue_size: EngineConfig::default().report_queue_size,
                    order_thread_core: -1,
                    report_thread_core: -1,
                    ..config
                })
                .unwrap_or_else(|_| unreachable!("default engine config is valid"))
            }
        }
    }

    /// Start the order and report workers. No effect if already running
    /// or already stopped (once-only lifecycle).
    pub fn start(&self) {
        let mut order_rx_slot = self.order_rx.lock();
        let mut report_rx_slot = self.report_rx.lock();

        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return; // Already running
        }

        let (order_rx, report_rx) = match (order_rx_slot.take(), report_rx_slot.take()) {
            (Some(order_rx), Some(report_rx)) => (order_rx, report_rx),
            _ => {
                self.shared.running.store(false, Ordering::Release);
                warn!("Engine start() after stop() has no effect");
                return;
            }
        };

        let shared = Arc::clone(&self.shared);
        let order_handle = thread::Builder::new()
            .name("exec-orders".to_string())
            .spawn(move || order_loop(shared, order_rx));

        let shared = Arc::clone(&self.shared);
        let report_handle = thread::Builder::new()
            .name("exec-reports".to_string())
            .spawn(move || report_loop(shared, report_rx));

        match (order_handle, report_handle) {
            (Ok(order), Ok(report)) => {
                *self.order_worker.lock() = Some(order);
                *self.report_worker.lock() = Some(report);
                info!("Execution engine started");
            }
            (order, report) => {
                self.shared.running.store(false, Ordering::Release);
                warn!("Failed to spawn engine workers");
                for handle in [order, report].into_iter().flatten() {
                    let _ = handle.join();
                }
            }
        }
    }

    /// Stop and join both workers. No effect on double-stop.
    pub fn stop(&self) {
        if self
            .shared
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if let Some(handle) = self.order_worker.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.report_worker.lock().take() {
            let _ = handle.join();
        }
        info!("Execution engine stopped");
    }

    /// Submit an order for execution
    ///
    /// Runs the risk check synchronously. On failure the callback
    /// receives exactly one `Rejected` report and the request is never
    /// retried. On pass, the order is queued for the order thread;
    /// `false` with no report means the inbound ring was full.
    pub fn submit_order(&self, request: OrderRequest) -> bool {
        let risk = self.shared.risk.check(&request, &self.shared.positions);
        if !risk.passed {
            self.shared.orders_rejected.fetch_add(1, Ordering::Relaxed);
            if let Some(cb) = &request.on_report {
                let report = ExecutionReport {
                    order_id: 0,
                    external_id: String::new(),
                    status: OrderStatus::Rejected,
                    filled_quantity: 0.0,
                    fill_price: 0.0,
                    remaining_quantity: request.quantity,
                    timestamp_ns: now_ns(),
                    message: risk.reason,
                };
                run_guarded("report_callback", || cb(&report));
            }
            return false;
        }

        let internal_id = self.shared.next_order_id.fetch_add(1, Ordering::AcqRel);
        let order = Order {
            internal_id,
            external_id: String::new(),
            market_id: request.market_id,
            venue: request.venue,
            side: request.side,
            order_type: request.order_type,
            status: OrderStatus::Pending,
            price: request.price,
            quantity: request.quantity,
            filled_quantity: 0.0,
            avg_fill_price: 0.0,
            created_ns: now_ns(),
            submitted_ns: 0,
            last_update_ns: 0,
            error_message: None,
        };

        // Callback must be reachable before any report can arrive
        if let Some(cb) = request.on_report {
            self.shared.callbacks.lock().insert(internal_id, cb);
        }

        if !self.order_tx.try_push(order) {
            self.shared.callbacks.lock().remove(&internal_id);
            warn!(internal_id, "Order queue full, submission dropped");
            return false;
        }
        true
    }

    /// Cancel an active order
    ///
    /// Mutates local state only; emitting a wire-level cancel is the
    /// venue connection's concern. `false` for unknown or already
    /// terminal orders.
    pub fn cancel_order(&self, order_id: u64) -> bool {
        let mut orders = self.shared.active_orders.lock();
        match orders.get_mut(&order_id) {
            Some(order) if !order.status.is_terminal() => {
                order.status = OrderStatus::Cancelled;
                order.last_update_ns = now_ns();
                debug!(order_id, "Order cancelled locally");
                true
            }
            _ => false,
        }
    }

    /// Snapshot copy of an order by internal id
    pub fn get_order(&self, order_id: u64) -> Option<Order> {
        self.shared.active_orders.lock().get(&order_id).cloned()
    }

    /// Current signed position for a market
    pub fn position(&self, market_id: &str) -> f64 {
        self.shared.positions.get(market_id)
    }

    /// Position tracker shared with the risk path
    pub fn positions(&self) -> &PositionTracker {
        &self.shared.positions
    }

    /// Store a shared connection handle for a venue
    pub fn register_connection(&self, venue: Protocol, conn: Arc<dyn MarketConnection>) {
        self.shared.connections.lock().insert(venue, conn);
    }

    /// Register a venue-specific outbound encoder (the JSON record
    /// encoder is the fallback)
    pub fn register_encoder(&self, venue: Protocol, encoder: Box<dyn OrderEncoder>) {
        self.shared.encoders.lock().insert(venue, encoder);
    }

    /// Hand out the report-queue producer
    ///
    /// Single-producer ring: the inbound parser path takes this exactly
    /// once and feeds venue reports through it.
    pub fn take_report_producer(&self) -> Option<SpscProducer<ExecutionReport>> {
        self.report_tx.lock().take()
    }

    /// Replace the risk limits at runtime
    pub fn set_risk_limits(&self, limits: RiskLimits) {
        self.shared.risk.set_limits(limits);
    }

    pub fn set_order_callback(&self, cb: impl Fn(&Order) + Send + Sync + 'static) {
        *self.shared.order_callback.write() = Some(Box::new(cb));
    }

    pub fn set_execution_callback(&self, cb: impl Fn(&ExecutionReport) + Send + Sync + 'static) {
        *self.shared.execution_callback.write() = Some(Box::new(cb));
    }

    /// Stats snapshot; reading has no side effects
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            orders_submitted: self.shared.orders_submitted.load(Ordering::Relaxed),
            orders_filled: self.shared.orders_filled.load(Ordering::Relaxed),
            orders_rejected: self.shared.orders_rejected.load(Ordering::Relaxed),
            total_volume: self.shared.total_volume.load(),
            avg_latency_ns: self.shared.avg_latency.get(),
        }
    }

    #[cfg(test)]
    fn callback_count(&self) -> usize {
        self.shared.callbacks.lock().len()
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn order_loop(shared: Arc<Shared>, orders: MpscConsumer<Order>) {
    let core = shared.config.order_thread_core;
    if core >= 0 {
        crate::perf::cpu::pin_to_core(core as usize);
    }

    while shared.running.load(Ordering::Acquire) {
        let mut order = match orders.try_pop() {
            Some(order) => order,
            None => {
                thread::yield_now();
                continue;
            }
        };

        order.status = OrderStatus::Submitted;
        order.submitted_ns = now_ns();
        order.last_update_ns = order.submitted_ns;
        shared.avg_latency.update(order.submitted_ns - order.created_ns);

        shared
            .active_orders
            .lock()
            .insert(order.internal_id, order.clone());

        send_to_venue(&shared, &order);
        shared.orders_submitted.fetch_add(1, Ordering::Relaxed);

        let callback = shared.order_callback.read();
        if let Some(cb) = callback.as_ref() {
            run_guarded("order_callback", || cb(&order));
        }
    }
}

fn send_to_venue(shared: &Shared, order: &Order) {
    let conn = shared.connections.lock().get(&order.venue).cloned();

    let conn = match conn {
        Some(conn) if conn.state() == ConnectionState::Connected => conn,
        Some(_) => {
            // Order stays Submitted in the index; a reconciler may later
            // mark it Error
            debug!(
                order_id = order.internal_id,
                venue = %order.venue,
                "Venue not connected, order held as submitted"
            );
            return;
        }
        None => {
            debug!(
                order_id = order.internal_id,
                venue = %order.venue,
                "No connection registered for venue"
            );
            return;
        }
    };

    let encoders = shared.encoders.lock();
    let bytes = match encoders.get(&order.venue) {
        Some(encoder) => encoder.encode(order),
        None => shared.default_encoder.encode(order),
    };
    drop(encoders);

    if !conn.send(&bytes) {
        warn!(order_id = order.internal_id, "Venue send failed");
    }
}

fn report_loop(shared: Arc<Shared>, reports: SpscConsumer<ExecutionReport>) {
    let core = shared.config.report_thread_core;
    if core >= 0 {
        crate::perf::cpu::pin_to_core(core as usize);
    }

    while shared.running.load(Ordering::Acquire) {
        let report = match reports.try_pop() {
            Some(report) => report,
            None => {
                thread::yield_now();
                continue;
            }
        };
        apply_report(&shared, report);
    }
}

fn apply_report(shared: &Shared, report: ExecutionReport) {
    {
        let mut orders = shared.active_orders.lock();
        if let Some(order) = orders.get_mut(&report.order_id) {
            // Reports apply in arrival order; a late report may regress
            // observed state
            order.status = report.status;
            order.filled_quantity = report.filled_quantity;
            order.last_update_ns = report.timestamp_ns;
            if report.fill_price > 0.0 {
                order.avg_fill_price = report.fill_price;
            }
            if !report.external_id.is_empty() {
                order.external_id = report.external_id.clone();
            }
            if report.status == OrderStatus::Error && !report.message.is_empty() {
                order.error_message = Some(report.message.clone());
            }

            if report.status == OrderStatus::Filled {
                shared.orders_filled.fetch_add(1, Ordering::Relaxed);
                shared.total_volume.fetch_add(report.filled_quantity);

                let delta = match order.side {
                    Side::Buy => report.filled_quantity,
                    Side::Sell => -report.filled_quantity,
                };
                shared.positions.update(&order.market_id, delta);
            }
        }
    }

    // Per-order callback, evicted once the order is terminal
    let callback = {
        let mut callbacks = shared.callbacks.lock();
        let cb = callbacks.get(&report.order_id).cloned();
        if report.status.is_terminal() {
            callbacks.remove(&report.order_id);
        }
        cb
    };
    if let Some(cb) = callback {
        run_guarded("report_callback", || cb(&report));
    }

    let execution_callback = shared.execution_callback.read();
    if let Some(cb) = execution_callback.as_ref() {
        run_guarded("execution_callback", || cb(&report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::types::OrderType;
    use crate::testing::wait_until;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn request(side: Side, quantity: f64, cb: Option<ReportCallback>) -> OrderRequest {
        OrderRequest {
            market_id: "M1".to_string(),
            venue: Protocol::KalshiWs,
            side,
            order_type: OrderType::Limit,
            price: 0.50,
            quantity,
            on_report: cb,
        }
    }

    fn fill_report(order_id: u64, quantity: f64) -> ExecutionReport {
        ExecutionReport {
            order_id,
            external_id: "EXT-1".to_string(),
            status: OrderStatus::Filled,
            filled_quantity: quantity,
            fill_price: 0.50,
            remaining_quantity: 0.0,
            timestamp_ns: now_ns(),
            message: String::new(),
        }
    }

    #[test]
    fn test_risk_rejection_reports_once_and_inserts_nothing() {
        let engine = ExecutionEngine::new(EngineConfig {
            risk_limits: RiskLimits {
                max_order_size: 100.0,
                ..RiskLimits::default()
            },
            ..EngineConfig::default()
        });

        let reports = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&reports);
        let accepted = engine.submit_order(request(
            Side::Buy,
            200.0,
            Some(Arc::new(move |report: &ExecutionReport| {
                seen.lock().push(report.clone());
            })),
        ));

        assert!(!accepted);

        let reports = reports.lock();
        assert_eq!(reports.len(), 1, "exactly one rejection report");
        assert_eq!(reports[0].status, OrderStatus::Rejected);
        assert!(reports[0].message.contains("size"));

        // No order entered the active index, no callback lingers
        assert!(engine.get_order(1).is_none());
        assert_eq!(engine.callback_count(), 0);
        assert_eq!(engine.stats().orders_rejected, 1);
    }

    #[test]
    fn test_submit_becomes_visible_after_order_thread() {
        let engine = ExecutionEngine::new(EngineConfig::default());
        engine.start();

        assert!(engine.submit_order(request(Side::Buy, 10.0, None)));

        assert!(wait_until(Duration::from_secs(2), || engine
            .get_order(1)
            .is_some()));

        let order = engine.get_order(1).unwrap();
        assert_eq!(order.status, OrderStatus::Submitted);
        assert!(order.submitted_ns >= order.created_ns);
        assert_eq!(engine.stats().orders_submitted, 1);

        engine.stop();
    }

    #[test]
    fn test_fill_updates_position_stats_and_evicts_callback() {
        let engine = ExecutionEngine::new(EngineConfig::default());
        engine.start();

        let fills = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&fills);
        assert!(engine.submit_order(request(
            Side::Buy,
            10.0,
            Some(Arc::new(move |report: &ExecutionReport| {
                assert_eq!(report.status, OrderStatus::Filled);
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        )));

        assert!(wait_until(Duration::from_secs(2), || engine
            .get_order(1)
            .is_some()));

        let report_tx = engine.take_report_producer().unwrap();
        assert!(report_tx.try_push(fill_report(1, 10.0)));

        assert!(wait_until(Duration::from_secs(2), || fills
            .load(Ordering::SeqCst)
            == 1));

        assert_eq!(engine.position("M1"), 10.0);
        let stats = engine.stats();
        assert_eq!(stats.orders_filled, 1);
        assert_eq!(stats.total_volume, 10.0);
        assert_eq!(engine.callback_count(), 0, "terminal report evicts callback");

        let order = engine.get_order(1).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.external_id, "EXT-1");

        engine.stop();
    }

    #[test]
    fn test_sell_fill_decrements_position() {
        let engine = ExecutionEngine::new(EngineConfig::default());
        engine.start();

        assert!(engine.submit_order(request(Side::Sell, 7.0, None)));
        assert!(wait_until(Duration::from_secs(2), || engine
            .get_order(1)
            .is_some()));

        let report_tx = engine.take_report_producer().unwrap();
        assert!(report_tx.try_push(fill_report(1, 7.0)));

        assert!(wait_until(Duration::from_secs(2), || {
            engine.position("M1") == -7.0
        }));

        engine.stop();
    }

    #[test]
    fn test_cancel_order() {
        let engine = ExecutionEngine::new(EngineConfig::default());
        engine.start();

        assert!(engine.submit_order(request(Side::Buy, 1.0, None)));
        assert!(wait_until(Duration::from_secs(2), || engine
            .get_order(1)
            .is_some()));
        engine.stop();

        assert!(engine.cancel_order(1));
        assert_eq!(engine.get_order(1).unwrap().status, OrderStatus::Cancelled);

        // Terminal orders cannot be cancelled again, unknown ids fail
        assert!(!engine.cancel_order(1));
        assert!(!engine.cancel_order(999));
    }

    #[test]
    fn test_order_sent_only_when_connected() {
        use crate::net::connection::{ConnectionConfig, SimulatedConnection};

        let engine = ExecutionEngine::new(EngineConfig::default());
        let conn = Arc::new(SimulatedConnection::new(
            Protocol::KalshiWs,
            ConnectionConfig::default(),
        ));
        engine.register_connection(Protocol::KalshiWs, conn.clone());
        engine.start();

        // Not connected: order held as submitted, nothing on the wire
        assert!(engine.submit_order(request(Side::Buy, 1.0, None)));
        assert!(wait_until(Duration::from_secs(2), || engine
            .get_order(1)
            .is_some()));
        assert!(conn.sent_frames().is_empty());
        assert_eq!(engine.get_order(1).unwrap().status, OrderStatus::Submitted);

        // Connected: the next order reaches the venue as the JSON record
        conn.connect();
        assert!(engine.submit_order(request(Side::Sell, 2.0, None)));
        assert!(wait_until(Duration::from_secs(2), || !conn
            .sent_frames()
            .is_empty()));

        let frames = conn.sent_frames();
        let text = String::from_utf8(frames[0].clone()).unwrap();
        assert!(text.contains("\"id\":2"));
        assert!(text.contains("\"side\":1"));

        engine.stop();
    }

    #[test]
    fn test_partial_fill_keeps_callback() {
        let engine = ExecutionEngine::new(EngineConfig::default());
        engine.start();

        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        assert!(engine.submit_order(request(
            Side::Buy,
            10.0,
            Some(Arc::new(move |_: &ExecutionReport| {
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        )));
        assert!(wait_until(Duration::from_secs(2), || engine
            .get_order(1)
            .is_some()));

        let report_tx = engine.take_report_producer().unwrap();
        let partial = ExecutionReport {
            status: OrderStatus::PartiallyFilled,
            filled_quantity: 4.0,
            remaining_quantity: 6.0,
            ..fill_report(1, 4.0)
        };
        assert!(report_tx.try_push(partial));

        assert!(wait_until(Duration::from_secs(2), || count
            .load(Ordering::SeqCst)
            == 1));
        assert_eq!(engine.callback_count(), 1, "non-terminal keeps the callback");
        assert_eq!(
            engine.get_order(1).unwrap().status,
            OrderStatus::PartiallyFilled
        );
        // Partial fills do not touch positions until Filled
        assert_eq!(engine.position("M1"), 0.0);

        assert!(report_tx.try_push(fill_report(1, 10.0)));
        assert!(wait_until(Duration::from_secs(2), || count
            .load(Ordering::SeqCst)
            == 2));
        assert_eq!(engine.callback_count(), 0);
        assert_eq!(engine.position("M1"), 10.0);

        engine.stop();
    }

    #[test]
    fn test_rate_limit_rejections() {
        let engine = ExecutionEngine::new(EngineConfig {
            risk_limits: RiskLimits {
                max_orders_per_second: 3,
                ..RiskLimits::default()
            },
            ..EngineConfig::default()
        });

        let mut accepted = 0;
        for _ in 0..10 {
            if engine.submit_order(request(Side::Buy, 1.0, None)) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 3, "at most max_orders_per_second pass per window");
        assert_eq!(engine.stats().orders_rejected, 7);
    }

    #[test]
    fn test_lifecycle_is_once_only() {
        let engine = ExecutionEngine::new(EngineConfig::default());
        engine.start();
        engine.start();
        engine.stop();
        engine.stop();
        engine.start(); // No effect after stop

        assert!(engine.submit_order(request(Side::Buy, 1.0, None)));
        std::thread::sleep(Duration::from_millis(50));
        assert!(
            engine.get_order(1).is_none(),
            "no worker must be consuming after stop"
        );
    }

    #[test]
    fn test_with_config_rejects_bad_core_and_capacity() {
        assert!(matches!(
            ExecutionEngine::with_config(EngineConfig {
                order_thread_core: i32::MAX,
                ..EngineConfig::default()
            }),
            Err(ConfigError::InvalidCore { .. })
        ));
        assert!(matches!(
            ExecutionEngine::with_config(EngineConfig {
                report_thread_core: i32::MAX,
                ..EngineConfig::default()
            }),
            Err(ConfigError::InvalidCore { .. })
        ));
        assert!(matches!(
            ExecutionEngine::with_config(EngineConfig {
                order_queue_size: 1000,
                ..EngineConfig::default()
            }),
            Err(ConfigError::InvalidCapacity { .. })
        ));
    }

    #[test]
    fn test_report_for_unknown_order_is_ignored() {
        let engine = ExecutionEngine::new(EngineConfig::default());
        engine.start();

        let report_tx = engine.take_report_producer().unwrap();
        assert!(report_tx.try_push(fill_report(42, 5.0)));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.stats().orders_filled, 0);
        assert_eq!(engine.position("M1"), 0.0);

        engine.stop();
    }
}
