//! Execution pipeline integration
//!
//! Submit -> risk -> order thread -> venue -> report thread -> position,
//! exercised through the public API only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use marsh_core::execution::{
    EngineConfig, ExecutionEngine, ExecutionReport, OrderRequest, OrderStatus, OrderType,
};
use marsh_core::net::{ConnectionConfig, MarketConnection, SimulatedConnection};
use marsh_core::perf::now_ns;
use marsh_core::risk::RiskLimits;
use marsh_core::testing::wait_until;
use marsh_core::{Protocol, Side};

fn request(market: &str, side: Side, quantity: f64) -> OrderRequest {
    OrderRequest {
        market_id: market.to_string(),
        venue: Protocol::KalshiWs,
        side,
        order_type: OrderType::Limit,
        price: 0.50,
        quantity,
        on_report: None,
    }
}

#[test]
fn test_oversized_order_rejected_with_size_reason() {
    let engine = ExecutionEngine::new(EngineConfig {
        risk_limits: RiskLimits {
            max_order_size: 100.0,
            ..RiskLimits::default()
        },
        ..EngineConfig::default()
    });
    engine.start();

    let reports: Arc<Mutex<Vec<ExecutionReport>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);

    let mut req = request("M1", Side::Buy, 200.0);
    req.on_report = Some(Arc::new(move |report: &ExecutionReport| {
        sink.lock().push(report.clone());
    }));

    assert!(!engine.submit_order(req));

    // Exactly one rejection, synchronously, naming the size check
    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, OrderStatus::Rejected);
    assert!(reports[0].message.contains("size"));

    // Nothing entered the active-order index
    std::thread::sleep(Duration::from_millis(50));
    assert!(engine.get_order(1).is_none());
    assert_eq!(engine.stats().orders_submitted, 0);

    engine.stop();
}

#[test]
fn test_buy_fill_accounting_end_to_end() {
    let engine = ExecutionEngine::new(EngineConfig::default());

    let conn = Arc::new(SimulatedConnection::new(
        Protocol::KalshiWs,
        ConnectionConfig::default(),
    ));
    conn.connect();
    engine.register_connection(Protocol::KalshiWs, conn.clone());
    engine.start();

    let fill_seen = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&fill_seen);

    let mut req = request("M", Side::Buy, 10.0);
    req.on_report = Some(Arc::new(move |report: &ExecutionReport| {
        assert_eq!(report.status, OrderStatus::Filled);
        assert_eq!(report.filled_quantity, 10.0);
        sink.fetch_add(1, Ordering::SeqCst);
    }));
    assert!(engine.submit_order(req));

    // The order reaches the venue as bytes once the order thread runs
    assert!(wait_until(Duration::from_secs(2), || !conn
        .sent_frames()
        .is_empty()));

    // Venue confirms the fill through the report queue
    let report_tx = engine.take_report_producer().unwrap();
    assert!(report_tx.try_push(ExecutionReport {
        order_id: 1,
        external_id: "K-77".to_string(),
        status: OrderStatus::Filled,
        filled_quantity: 10.0,
        fill_price: 0.50,
        remaining_quantity: 0.0,
        timestamp_ns: now_ns(),
        message: String::new(),
    }));

    assert!(wait_until(Duration::from_secs(2), || fill_seen
        .load(Ordering::SeqCst)
        == 1));

    assert_eq!(engine.position("M"), 10.0);
    let stats = engine.stats();
    assert_eq!(stats.orders_filled, 1);
    assert_eq!(stats.total_volume, 10.0);

    let order = engine.get_order(1).unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.external_id, "K-77");
    assert_eq!(order.avg_fill_price, 0.50);

    // A second fill report for the same id finds no callback: it was
    // evicted at the terminal status
    assert!(report_tx.try_push(ExecutionReport {
        order_id: 1,
        external_id: "K-77".to_string(),
        status: OrderStatus::Filled,
        filled_quantity: 10.0,
        fill_price: 0.50,
        remaining_quantity: 0.0,
        timestamp_ns: now_ns(),
        message: String::new(),
    }));
    assert!(wait_until(Duration::from_secs(2), || engine
        .stats()
        .orders_filled
        == 2));
    assert_eq!(
        fill_seen.load(Ordering::SeqCst),
        1,
        "evicted callback must not fire again"
    );

    engine.stop();
}

#[test]
fn test_buy_then_sell_nets_position() {
    let engine = ExecutionEngine::new(EngineConfig::default());
    engine.start();

    assert!(engine.submit_order(request("M", Side::Buy, 10.0)));
    assert!(engine.submit_order(request("M", Side::Sell, 4.0)));

    assert!(wait_until(Duration::from_secs(2), || engine
        .stats()
        .orders_submitted
        == 2));

    let report_tx = engine.take_report_producer().unwrap();
    for (order_id, qty) in [(1u64, 10.0), (2u64, 4.0)] {
        assert!(report_tx.try_push(ExecutionReport {
            order_id,
            external_id: String::new(),
            status: OrderStatus::Filled,
            filled_quantity: qty,
            fill_price: 0.50,
            remaining_quantity: 0.0,
            timestamp_ns: now_ns(),
            message: String::new(),
        }));
    }

    assert!(wait_until(Duration::from_secs(2), || engine
        .stats()
        .orders_filled
        == 2));
    assert_eq!(engine.position("M"), 6.0);
    assert_eq!(engine.stats().total_volume, 14.0);

    engine.stop();
}

#[test]
fn test_rate_limit_window_recovers_after_a_second() {
    let engine = ExecutionEngine::new(EngineConfig {
        risk_limits: RiskLimits {
            max_orders_per_second: 2,
            ..RiskLimits::default()
        },
        ..EngineConfig::default()
    });

    assert!(engine.submit_order(request("M", Side::Buy, 1.0)));
    assert!(engine.submit_order(request("M", Side::Buy, 1.0)));
    assert!(!engine.submit_order(request("M", Side::Buy, 1.0)));

    // The sliding window empties after a full second
    std::thread::sleep(Duration::from_millis(1_100));
    assert!(engine.submit_order(request("M", Side::Buy, 1.0)));
}

#[test]
fn test_position_limit_uses_live_positions() {
    let engine = ExecutionEngine::new(EngineConfig {
        risk_limits: RiskLimits {
            max_position_per_market: 15.0,
            ..RiskLimits::default()
        },
        ..EngineConfig::default()
    });
    engine.start();

    assert!(engine.submit_order(request("M", Side::Buy, 10.0)));
    assert!(wait_until(Duration::from_secs(2), || engine
        .stats()
        .orders_submitted
        == 1));

    let report_tx = engine.take_report_producer().unwrap();
    assert!(report_tx.try_push(ExecutionReport {
        order_id: 1,
        external_id: String::new(),
        status: OrderStatus::Filled,
        filled_quantity: 10.0,
        fill_price: 0.50,
        remaining_quantity: 0.0,
        timestamp_ns: now_ns(),
        message: String::new(),
    }));
    assert!(wait_until(Duration::from_secs(2), || engine.position("M") == 10.0));

    // 10 + 10 would breach the 15 limit; selling is still allowed
    assert!(!engine.submit_order(request("M", Side::Buy, 10.0)));
    assert!(engine.submit_order(request("M", Side::Sell, 10.0)));

    engine.stop();
}
