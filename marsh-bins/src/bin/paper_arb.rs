//! Paper arbitrage run over simulated venues
//!
//! Wires the full pipeline end to end without touching a network:
//! simulated Kalshi + Polymarket connections feed the normalizer, the
//! handler maintains per-venue quotes, the detector scans for
//! dislocations, and detected opportunities are routed through the
//! risk-checked engine. Venue fills are synthesized off the frames the
//! simulated connections capture.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use marsh_core::engine::{ArbitrageConfig, ArbitrageDetector, OrderRouter, RouterConfig};
use marsh_core::execution::{
    EngineConfig, ExecutionEngine, ExecutionReport, OrderRequest, OrderStatus, OrderType,
};
use marsh_core::net::{ConnectionConfig, ConnectionPool, MarketConnection, SimulatedConnection};
use marsh_core::perf::now_ns;
use marsh_core::risk::RiskLimits;
use marsh_core::testing::frames;
use marsh_core::utils::init_logger;
use marsh_core::{
    HandlerConfig, MarketDataHandler, PacketNormalizer, Protocol, RawPacket, Side,
};
use tracing::info;

const MARKETS: [&str; 3] = ["FED-CUT-MAR", "BTC-100K-JUN", "SENATE-2026"];
const RUN_MS: u64 = 750;

fn main() -> anyhow::Result<()> {
    init_logger("info", false);
    info!("Paper arbitrage run starting");

    // Data plane
    let normalizer = Arc::new(PacketNormalizer::new());
    let handler = Arc::new(MarketDataHandler::new(HandlerConfig::default()));
    handler.start();

    // Venue links
    let kalshi = Arc::new(SimulatedConnection::new(
        Protocol::KalshiWs,
        ConnectionConfig::default(),
    ));
    let poly = Arc::new(SimulatedConnection::new(
        Protocol::PolymarketWs,
        ConnectionConfig::default(),
    ));

    let pool = ConnectionPool::new(4);
    pool.add(kalshi.clone());
    pool.add(poly.clone());
    pool.connect_all();

    for conn in [&kalshi, &poly] {
        let normalizer = Arc::clone(&normalizer);
        let handler = Arc::clone(&handler);
        conn.set_data_callback(Box::new(move |packet: RawPacket| {
            if let Some(msg) = normalizer.normalize(&packet) {
                handler.on_message(msg);
            }
        }));
        conn.subscribe("book", None);
    }

    // Execution
    let engine = Arc::new(ExecutionEngine::new(EngineConfig {
        risk_limits: RiskLimits {
            max_order_size: 500.0,
            max_orders_per_second: 50,
            ..RiskLimits::default()
        },
        ..EngineConfig::default()
    }));
    engine.register_connection(Protocol::KalshiWs, kalshi.clone());
    engine.register_connection(Protocol::PolymarketWs, poly.clone());
    engine.start();

    let report_tx = engine
        .take_report_producer()
        .ok_or_else(|| anyhow::anyhow!("report producer already taken"))?;

    // Detector + router
    let detector = Arc::new(ArbitrageDetector::new(
        Arc::clone(&handler),
        ArbitrageConfig {
            min_profit: 0.5,
            ..ArbitrageConfig::default()
        },
    ));

    let router = Arc::new(OrderRouter::new(
        Arc::clone(&engine),
        Arc::clone(&handler),
        RouterConfig::default(),
    ));

    {
        let router = Arc::clone(&router);
        detector.set_callback(move |opp| {
            // Paper-trade the buy leg of fresh opportunities; the rate
            // limiter keeps the re-fired cache entries in check
            if !opp.stale && opp.confidence > 0.9 {
                router.route_order(OrderRequest {
                    market_id: opp.market_id.clone(),
                    venue: opp.buy_venue,
                    side: Side::Buy,
                    order_type: OrderType::Ioc,
                    price: opp.buy_price,
                    quantity: opp.max_size.min(100.0),
                    on_report: None,
                });
            }
        });
    }
    detector.start();

    // Feed both venues a dislocated market picture
    let feeder = {
        let kalshi = kalshi.clone();
        let poly = poly.clone();
        thread::spawn(move || {
            for round in 0u32..20 {
                for (idx, market) in MARKETS.iter().enumerate() {
                    let base = 0.40 + idx as f64 * 0.10;
                    let frame = frames::kalshi_quote(
                        market,
                        round + 1,
                        base,
                        base + 0.02,
                        400.0,
                        400.0,
                    );
                    kalshi.inject_packet(RawPacket::new(Protocol::KalshiWs, frame, now_ns()));

                    // Polymarket trades the same market a touch richer
                    let json = serde_json::json!({
                        "event_type": "book",
                        "market": market,
                        "bids": [{"price": format!("{:.3}", base + 0.035), "size": "400"}],
                        "asks": [{"price": format!("{:.3}", base + 0.055), "size": "400"}],
                    });
                    poly.inject_packet(RawPacket::new(
                        Protocol::PolymarketWs,
                        json.to_string().into_bytes(),
                        now_ns(),
                    ));
                }
                thread::sleep(Duration::from_millis(25));
            }
        })
    };

    // Acknowledge every frame the venues captured with a synthetic fill
    let reporter = {
        let kalshi = kalshi.clone();
        let poly = poly.clone();
        thread::spawn(move || {
            let mut acked = 0usize;
            let deadline = std::time::Instant::now() + Duration::from_millis(RUN_MS);
            while std::time::Instant::now() < deadline {
                let frames: Vec<Vec<u8>> = kalshi
                    .sent_frames()
                    .into_iter()
                    .chain(poly.sent_frames())
                    .collect();
                for frame in frames.iter().skip(acked) {
                    if let Ok(value) =
                        serde_json::from_slice::<serde_json::Value>(frame)
                    {
                        let order_id = value["id"].as_u64().unwrap_or(0);
                        let qty = value["qty"].as_f64().unwrap_or(0.0);
                        let price = value["price"].as_f64().unwrap_or(0.0);
                        report_tx.try_push(ExecutionReport {
                            order_id,
                            external_id: format!("SIM-{}", order_id),
                            status: OrderStatus::Filled,
                            filled_quantity: qty,
                            fill_price: price,
                            remaining_quantity: 0.0,
                            timestamp_ns: now_ns(),
                            message: String::new(),
                        });
                    }
                    acked += 1;
                }
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    thread::sleep(Duration::from_millis(RUN_MS));
    let _ = feeder.join();
    let _ = reporter.join();

    detector.stop();
    engine.stop();
    handler.stop();
    pool.disconnect_all();

    // Final accounting
    let normalizer_stats = normalizer.stats();
    let handler_stats = handler.stats();
    let detector_stats = detector.stats();
    let engine_stats = engine.stats();

    info!(
        packets = normalizer_stats.packets_in,
        messages = normalizer_stats.messages_out,
        failures = normalizer_stats.parse_failures,
        "Normalizer"
    );
    info!(
        quotes = handler_stats.quotes_received,
        books = handler_stats.books_received,
        drops = handler_stats.queue_drops,
        avg_latency_ns = handler_stats.avg_processing_latency_ns,
        "Handler"
    );
    info!(
        scans = detector_stats.scans,
        found = detector_stats.opportunities_found,
        theoretical_profit = format!("{:.2}", detector_stats.total_theoretical_profit),
        "Detector"
    );
    info!(
        submitted = engine_stats.orders_submitted,
        filled = engine_stats.orders_filled,
        rejected = engine_stats.orders_rejected,
        volume = format!("{:.1}", engine_stats.total_volume),
        "Engine"
    );
    for market in MARKETS {
        let position = engine.position(market);
        if position != 0.0 {
            info!(market, position, "Position");
        }
    }

    info!("Paper arbitrage run complete");
    Ok(())
}
