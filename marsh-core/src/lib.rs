//! Marsh Core - Low-Latency Cross-Venue Trading Core
//!
//! A latency-focused trading core for prediction markets and DEX venues.
//! Ingests raw venue packets, normalizes them into a single message sum
//! type, maintains per-market quotes and order books, detects cross-venue
//! arbitrage, and routes orders through a risk-checked execution pipeline.
//!
//! ## System Architecture
//!
//! ```text
//! ┌──────────────┐   RawPacket    ┌──────────────────┐  NormalizedMessage
//! │  Venue       │ ─────────────▶ │ PacketNormalizer │ ──────────────┐
//! │  Connections │                └──────────────────┘               │
//! └──────────────┘                                                   ▼
//!        ▲                                              ┌─────────────────────┐
//!        │ send(bytes)                                  │  MarketDataHandler  │
//!        │                                              │  (MPSC ring +       │
//! ┌──────┴────────┐   Order    ┌──────────────┐         │   worker thread)    │
//! │ ExecutionEngine│ ◀──────── │  OrderRouter │         └─────────────────────┘
//! │ (order thread +│           └──────────────┘                  │ quotes/books
//! │  report thread)│                  ▲                          ▼
//! └───────────────┘                   │            ┌──────────────────────┐
//!        ▲                           reads         │  ArbitrageDetector   │
//!        │ ExecutionReport (SPSC)     └─────────── │  (1ms scan thread)   │
//!        └─────────────────────────────────────────└──────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! - **Wait-free message passing** - bounded SPSC/MPSC rings with
//!   cache-line-isolated endpoints are the only spine between threads
//! - **No blocking on the hot path** - workers spin-pop their queue and
//!   yield when empty; blocking exists only inside venue connections and
//!   the short exclusive-lock window of map upserts
//! - **Sentinel errors, not panics** - hot paths return `Option`/`bool`;
//!   construction-time invariants fail construction
//! - **Lossy market data** - a stalled handler drops updates and counts
//!   them instead of stalling the parser
//!
//! ## Core Modules
//!
//! - [`core`] - shared types ([`Protocol`], [`Side`]), config errors, and
//!   the SPSC/MPSC ring buffers
//! - [`perf`] - monotonic clock, latency statistics, CPU pinning
//! - [`data`] - packet normalization and the market-data handler
//! - [`orderbook`] - sorted per-market books and read-only views
//! - [`risk`] - pre-trade checks and position tracking
//! - [`execution`] - order lifecycle and the execution engine
//! - [`engine`] - arbitrage detection and smart order routing
//! - [`net`] - the abstract venue connection and connection pool
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use marsh_core::prelude::*;
//! use std::sync::Arc;
//!
//! let handler = Arc::new(MarketDataHandler::new(HandlerConfig::default()));
//! handler.start();
//!
//! let detector = ArbitrageDetector::new(Arc::clone(&handler), ArbitrageConfig::default());
//! detector.start();
//!
//! let engine = Arc::new(ExecutionEngine::new(EngineConfig::default()));
//! engine.start();
//!
//! let router = OrderRouter::new(Arc::clone(&engine), Arc::clone(&handler), RouterConfig::default());
//! # let _ = router;
//! ```

pub mod core;
pub mod perf;

pub mod data;
pub mod orderbook;

pub mod risk;
pub mod execution;
pub mod engine;

pub mod net;
pub mod testing;
pub mod utils;

// Re-export the shared data model
pub use crate::core::{ConfigError, Protocol, Side};
pub use data::{
    BookLevel, MarketDataUpdate, NormalizedMessage, OrderBookSnapshot, OrderFill, Quote,
    RawPacket, TradeEvent,
};

// Re-export the component front doors
pub use data::{HandlerConfig, MarketDataHandler, PacketNormalizer};
pub use engine::{ArbitrageConfig, ArbitrageDetector, OrderRouter, RouterConfig};
pub use execution::{EngineConfig, ExecutionEngine, ExecutionReport, Order, OrderRequest};
pub use risk::{PositionTracker, RiskLimits, RiskManager};

// Re-export error types
pub use anyhow::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    // Shared data model
    pub use crate::core::{Protocol, Side};
    pub use crate::data::{NormalizedMessage, Quote, RawPacket};

    // Components
    pub use crate::data::{HandlerConfig, MarketDataHandler, PacketNormalizer};
    pub use crate::engine::{
        ArbitrageConfig, ArbitrageDetector, OrderRouter, RouterConfig, RoutingStrategy,
    };
    pub use crate::execution::{
        EngineConfig, ExecutionEngine, ExecutionReport, Order, OrderRequest, OrderStatus,
        OrderType,
    };
    pub use crate::net::{ConnectionPool, ConnectionState, MarketConnection};
    pub use crate::risk::RiskLimits;

    // Performance utilities
    pub use crate::perf::{configure_low_latency, now_ns, pin_to_core, LatencyStats};

    // Error types
    pub use crate::{Error, Result};
}
