//! Strategy-side components over the data plane
//!
//! - [`ArbitrageDetector`]: periodic cross-venue scan over the handler's
//!   per-venue quotes, producing cached [`ArbitrageOpportunity`] records
//! - [`OrderRouter`]: venue-selection policy on top of the execution
//!   engine and market data

pub mod arbitrage;
pub mod router;

pub use arbitrage::{
    ArbitrageConfig, ArbitrageDetector, ArbitrageOpportunity, DetectorStats,
};
pub use router::{OrderRouter, RouterConfig, RoutingDecision, RoutingStrategy, VenueStats};
