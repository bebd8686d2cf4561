//! Normalized market-data messages
//!
//! Every venue feed is reduced to one closed sum type so downstream
//! consumers dispatch on an enum tag, never on an open class hierarchy.
//! All timestamps are monotonic nanoseconds stamped from packet receipt.

use crate::core::{Protocol, Side};

/// Raw packet buffer with protocol context
///
/// Owned by the normalizer until it is consumed by a parser.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub protocol: Protocol,
    pub data: Vec<u8>,
    pub recv_timestamp_ns: i64,
}

impl RawPacket {
    pub fn new(protocol: Protocol, data: Vec<u8>, recv_timestamp_ns: i64) -> Self {
        Self {
            protocol,
            data,
            recv_timestamp_ns,
        }
    }
}

/// Normalized top-of-book market data update
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataUpdate {
    pub source: Protocol,
    pub market_id: String,
    pub symbol: String,

    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub last_price: f64,
    pub volume_24h: f64,

    pub timestamp_ns: i64,
    pub sequence: u32,
}

/// One price level of an order book
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
    pub timestamp_ns: i64,
}

/// Normalized order book snapshot
///
/// `bids` sorted price-descending, `asks` price-ascending as parsed off
/// the wire; applying a snapshot re-sorts either way.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookSnapshot {
    pub source: Protocol,
    pub market_id: String,

    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,

    pub timestamp_ns: i64,
    pub sequence: u32,
}

/// Normalized trade event
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub source: Protocol,
    pub market_id: String,
    pub trade_id: String,

    pub aggressor_side: Side,
    pub price: f64,
    pub size: f64,

    pub timestamp_ns: i64,
}

/// Normalized order fill from a venue
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFill {
    pub source: Protocol,
    pub order_id: String,
    pub market_id: String,

    pub side: Side,
    pub price: f64,
    pub filled_size: f64,
    pub remaining_size: f64,

    pub is_complete: bool,
    pub timestamp_ns: i64,
}

/// Union of all normalized message types
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedMessage {
    MarketData(MarketDataUpdate),
    BookSnapshot(OrderBookSnapshot),
    Trade(TradeEvent),
    Fill(OrderFill),
}

impl NormalizedMessage {
    /// Venue the message originated from
    pub fn source(&self) -> Protocol {
        match self {
            NormalizedMessage::MarketData(m) => m.source,
            NormalizedMessage::BookSnapshot(m) => m.source,
            NormalizedMessage::Trade(m) => m.source,
            NormalizedMessage::Fill(m) => m.source,
        }
    }

    /// Market the message refers to
    pub fn market_id(&self) -> &str {
        match self {
            NormalizedMessage::MarketData(m) => &m.market_id,
            NormalizedMessage::BookSnapshot(m) => &m.market_id,
            NormalizedMessage::Trade(m) => &m.market_id,
            NormalizedMessage::Fill(m) => &m.market_id,
        }
    }

    /// Receive timestamp stamped by the normalizer
    pub fn timestamp_ns(&self) -> i64 {
        match self {
            NormalizedMessage::MarketData(m) => m.timestamp_ns,
            NormalizedMessage::BookSnapshot(m) => m.timestamp_ns,
            NormalizedMessage::Trade(m) => m.timestamp_ns,
            NormalizedMessage::Fill(m) => m.timestamp_ns,
        }
    }
}

/// Top-of-book snapshot for quick access
///
/// A zero price means that side is absent. When both sides are present
/// the handler guarantees `bid_price <= ask_price` was observed at
/// ingress; crossed inputs are stored as-is and surfaced via book state.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub market_id: String,
    pub source: Protocol,

    pub bid_price: f64,
    pub bid_size: f64,
    pub ask_price: f64,
    pub ask_size: f64,

    pub timestamp_ns: i64,
}

impl Quote {
    /// Arithmetic mean of best bid and ask
    #[inline]
    pub fn mid_price(&self) -> f64 {
        (self.bid_price + self.ask_price) / 2.0
    }

    /// Best ask minus best bid
    #[inline]
    pub fn spread(&self) -> f64 {
        self.ask_price - self.bid_price
    }

    /// Nanoseconds elapsed since the quote's source timestamp
    #[inline]
    pub fn age_ns(&self, now_ns: i64) -> i64 {
        (now_ns - self.timestamp_ns).max(0)
    }
}

impl From<&MarketDataUpdate> for Quote {
    fn from(update: &MarketDataUpdate) -> Self {
        Self {
            market_id: update.market_id.clone(),
            source: update.source,
            bid_price: update.bid_price,
            bid_size: update.bid_size,
            ask_price: update.ask_price,
            ask_size: update.ask_size,
            timestamp_ns: update.timestamp_ns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_update() -> MarketDataUpdate {
        MarketDataUpdate {
            source: Protocol::KalshiWs,
            market_id: "M1".to_string(),
            symbol: String::new(),
            bid_price: 0.50,
            ask_price: 0.52,
            bid_size: 1000.0,
            ask_size: 800.0,
            last_price: 0.0,
            volume_24h: 0.0,
            timestamp_ns: 1_000,
            sequence: 7,
        }
    }

    #[test]
    fn test_quote_from_update() {
        let update = sample_update();
        let quote = Quote::from(&update);

        assert_eq!(quote.market_id, "M1");
        assert_eq!(quote.source, Protocol::KalshiWs);
        assert_eq!(quote.bid_price, 0.50);
        assert_eq!(quote.ask_size, 800.0);
        assert_eq!(quote.timestamp_ns, 1_000);
    }

    #[test]
    fn test_quote_derived_fields() {
        let quote = Quote::from(&sample_update());
        assert!((quote.mid_price() - 0.51).abs() < 1e-12);
        assert!((quote.spread() - 0.02).abs() < 1e-12);
        assert_eq!(quote.age_ns(1_500), 500);
        assert_eq!(quote.age_ns(500), 0, "clock skew clamps to zero");
    }

    #[test]
    fn test_message_accessors() {
        let msg = NormalizedMessage::MarketData(sample_update());
        assert_eq!(msg.source(), Protocol::KalshiWs);
        assert_eq!(msg.market_id(), "M1");
        assert_eq!(msg.timestamp_ns(), 1_000);
    }
}
