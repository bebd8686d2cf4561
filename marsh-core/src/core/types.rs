//! Venue and side tags shared across the data plane
//!
//! Single-byte enums keep message structs small and comparisons cheap.
//! `fixed_point` provides the integer price representation used as
//! ordered order-book keys (IEEE doubles stay at the wire boundary).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported market protocols
///
/// Closed enumeration of venues. Each venue connection, parser, and
/// per-venue quote is tagged with one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Protocol {
    Unknown = 0,
    KalshiRest = 1,
    KalshiWs = 2,
    PolymarketRest = 3,
    PolymarketWs = 4,
    UniswapV3 = 5,
    Dydx = 6,
    CustomDex = 7,
}

impl Protocol {
    /// True for either Kalshi transport
    #[inline(always)]
    pub const fn is_kalshi(&self) -> bool {
        matches!(self, Protocol::KalshiRest | Protocol::KalshiWs)
    }

    /// True for either Polymarket transport
    #[inline(always)]
    pub const fn is_polymarket(&self) -> bool {
        matches!(self, Protocol::PolymarketRest | Protocol::PolymarketWs)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Unknown => "unknown",
            Protocol::KalshiRest => "kalshi-rest",
            Protocol::KalshiWs => "kalshi-ws",
            Protocol::PolymarketRest => "polymarket-rest",
            Protocol::PolymarketWs => "polymarket-ws",
            Protocol::UniswapV3 => "uniswap-v3",
            Protocol::Dydx => "dydx",
            Protocol::CustomDex => "custom-dex",
        };
        write!(f, "{}", name)
    }
}

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    /// Sign applied to quantities when updating positions
    #[inline(always)]
    pub const fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Fixed-point conversion utilities
///
/// 9 decimal places, matching the precision the order books key on.
/// f64 prices from the wire are converted once at the book boundary.
pub mod fixed_point {
    /// Scale factor for 9 decimal places
    pub const SCALE: i64 = 1_000_000_000;

    /// Convert f64 to fixed-point i64
    #[inline(always)]
    pub fn from_f64(value: f64) -> i64 {
        (value * SCALE as f64).round() as i64
    }

    /// Convert fixed-point i64 to f64
    #[inline(always)]
    pub fn to_f64(value: i64) -> f64 {
        value as f64 / SCALE as f64
    }

    /// Convert f64 to an unsigned fixed-point key (negative clamps to 0)
    #[inline(always)]
    pub fn key_from_f64(value: f64) -> u64 {
        from_f64(value).max(0) as u64
    }

    /// Convert an unsigned fixed-point key back to f64
    #[inline(always)]
    pub fn key_to_f64(value: u64) -> f64 {
        value as f64 / SCALE as f64
    }
}
