//! Packet Normalizer
//!
//! Transforms raw venue packets into [`NormalizedMessage`]s. Handles
//! byte-order conversion, field extraction, and protocol dispatch.
//!
//! Parsers are total: a malformed, truncated, or unknown frame yields
//! `None` and bumps a counter. Nothing on this path panics or reads out
//! of bounds. Parsers stamp `timestamp_ns` from packet receipt and never
//! consult the system clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use tracing::debug;

use crate::core::{Protocol, Side};
use crate::data::types::{
    BookLevel, MarketDataUpdate, NormalizedMessage, OrderBookSnapshot, RawPacket, TradeEvent,
};

// Network-byte-order field readers. Bounds-checked: a short buffer reads
// as None, never as a panic.

#[inline]
fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[inline]
fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
fn be_f64(data: &[u8], offset: usize) -> Option<f64> {
    let bytes = data.get(offset..offset + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(f64::from_be_bytes(buf))
}

/// Fixed 16-byte ASCII market id, NUL-padded on the wire
#[inline]
fn market_id_at(data: &[u8], offset: usize) -> Option<String> {
    let bytes = data.get(offset..offset + 16)?;
    let text = String::from_utf8_lossy(bytes);
    Some(text.trim_end_matches('\0').to_string())
}

/// Per-protocol frame parser
pub trait ProtocolParser: Send + Sync {
    /// Protocol this parser is registered under
    fn protocol(&self) -> Protocol;

    /// Parse one packet. `None` means the frame was not parseable; the
    /// caller counts and drops it.
    fn parse(&self, packet: &RawPacket) -> Option<NormalizedMessage>;
}

/// Kalshi binary frame parser
///
/// Frame layout (all multi-byte fields network byte order):
///
/// ```text
/// [u16 msg_type][u16 flags][u32 sequence][payload...]
///   0x0001 quote   0x0002 trade   0x0003 book snapshot
/// ```
#[derive(Debug, Default)]
pub struct KalshiParser;

impl KalshiParser {
    pub const MSG_QUOTE: u16 = 0x0001;
    pub const MSG_TRADE: u16 = 0x0002;
    pub const MSG_BOOK: u16 = 0x0003;

    /// Quote: market_id@8, then bid_price/ask_price/bid_size/ask_size
    /// doubles at 24/32/40/48. Frames shorter than 56 bytes are dropped.
    fn parse_quote(&self, packet: &RawPacket, sequence: u32) -> Option<NormalizedMessage> {
        let data = &packet.data;
        if data.len() < 56 {
            return None;
        }

        Some(NormalizedMessage::MarketData(MarketDataUpdate {
            source: Protocol::KalshiWs,
            market_id: market_id_at(data, 8)?,
            symbol: String::new(),
            bid_price: be_f64(data, 24)?,
            ask_price: be_f64(data, 32)?,
            bid_size: be_f64(data, 40)?,
            ask_size: be_f64(data, 48)?,
            last_price: 0.0,
            volume_24h: 0.0,
            timestamp_ns: packet.recv_timestamp_ns,
            sequence,
        }))
    }

    /// Trade: market_id@8, aggressor byte@24 (0 = buy), price@32,
    /// size@40. The frame sequence doubles as the trade id.
    fn parse_trade(&self, packet: &RawPacket, sequence: u32) -> Option<NormalizedMessage> {
        let data = &packet.data;
        if data.len() < 48 {
            return None;
        }

        let aggressor = if data[24] == 0 { Side::Buy } else { Side::Sell };

        Some(NormalizedMessage::Trade(TradeEvent {
            source: Protocol::KalshiWs,
            market_id: market_id_at(data, 8)?,
            trade_id: sequence.to_string(),
            aggressor_side: aggressor,
            price: be_f64(data, 32)?,
            size: be_f64(data, 40)?,
            timestamp_ns: packet.recv_timestamp_ns,
        }))
    }

    /// Book snapshot: market_id@8, u16 bid/ask level counts at 24/26,
    /// then 16-byte `[price][size]` pairs from 28. Parsing stops at
    /// whichever runs out first, declared levels or frame bytes;
    /// truncation just yields shorter vectors.
    fn parse_book(&self, packet: &RawPacket, sequence: u32) -> Option<NormalizedMessage> {
        let data = &packet.data;
        if data.len() < 32 {
            return None;
        }

        let market_id = market_id_at(data, 8)?;
        let bid_levels = be_u16(data, 24)?;
        let ask_levels = be_u16(data, 26)?;

        let mut offset = 28usize;
        let mut bids = Vec::with_capacity(bid_levels as usize);
        let mut asks = Vec::with_capacity(ask_levels as usize);

        for _ in 0..bid_levels {
            if offset + 16 > data.len() {
                break;
            }
            bids.push(BookLevel {
                price: be_f64(data, offset)?,
                size: be_f64(data, offset + 8)?,
                timestamp_ns: packet.recv_timestamp_ns,
            });
            offset += 16;
        }

        for _ in 0..ask_levels {
            if offset + 16 > data.len() {
                break;
            }
            asks.push(BookLevel {
                price: be_f64(data, offset)?,
                size: be_f64(data, offset + 8)?,
                timestamp_ns: packet.recv_timestamp_ns,
            });
            offset += 16;
        }

        Some(NormalizedMessage::BookSnapshot(OrderBookSnapshot {
            source: Protocol::KalshiWs,
            market_id,
            bids,
            asks,
            timestamp_ns: packet.recv_timestamp_ns,
            sequence,
        }))
    }
}

impl ProtocolParser for KalshiParser {
    fn protocol(&self) -> Protocol {
        Protocol::KalshiWs
    }

    fn parse(&self, packet: &RawPacket) -> Option<NormalizedMessage> {
        let data = &packet.data;
        if data.len() < 8 {
            return None;
        }

        let msg_type = be_u16(data, 0)?;
        let _flags = be_u16(data, 2)?;
        let sequence = be_u32(data, 4)?;

        match msg_type {
            Self::MSG_QUOTE => self.parse_quote(packet, sequence),
            Self::MSG_TRADE => self.parse_trade(packet, sequence),
            Self::MSG_BOOK => self.parse_book(packet, sequence),
            _ => None,
        }
    }
}

// Polymarket CLOB websocket JSON. Prices and sizes arrive as decimal
// strings; field order is arbitrary and unknown fields must be ignored.

#[derive(Debug, Deserialize)]
struct PolyLevel {
    price: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct PolyFrame {
    event_type: String,

    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,

    // Book snapshot levels; older frames used buys/sells
    #[serde(default, alias = "buys")]
    bids: Vec<PolyLevel>,
    #[serde(default, alias = "sells")]
    asks: Vec<PolyLevel>,

    // last_trade_price fields
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    side: Option<String>,
}

impl PolyFrame {
    fn market_id(&self) -> Option<String> {
        self.market
            .clone()
            .or_else(|| self.asset_id.clone())
            .filter(|id| !id.is_empty())
    }
}

fn parse_decimal(text: &str) -> Option<f64> {
    let value: f64 = text.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

fn parse_levels(levels: &[PolyLevel], timestamp_ns: i64) -> Option<Vec<BookLevel>> {
    levels
        .iter()
        .map(|l| {
            Some(BookLevel {
                price: parse_decimal(&l.price)?,
                size: parse_decimal(&l.size)?,
                timestamp_ns,
            })
        })
        .collect()
}

/// Polymarket JSON frame parser
#[derive(Debug, Default)]
pub struct PolymarketParser;

impl ProtocolParser for PolymarketParser {
    fn protocol(&self) -> Protocol {
        Protocol::PolymarketWs
    }

    fn parse(&self, packet: &RawPacket) -> Option<NormalizedMessage> {
        let frame: PolyFrame = serde_json::from_slice(&packet.data).ok()?;
        let ts = packet.recv_timestamp_ns;

        match frame.event_type.as_str() {
            "book" => {
                let market_id = frame.market_id()?;
                let mut bids = parse_levels(&frame.bids, ts)?;
                let mut asks = parse_levels(&frame.asks, ts)?;
                // Venue sends books unsorted on occasion
                bids.sort_by(|a, b| b.price.total_cmp(&a.price));
                asks.sort_by(|a, b| a.price.total_cmp(&b.price));

                Some(NormalizedMessage::BookSnapshot(OrderBookSnapshot {
                    source: Protocol::PolymarketWs,
                    market_id,
                    bids,
                    asks,
                    timestamp_ns: ts,
                    sequence: 0,
                }))
            }
            "last_trade_price" => {
                let side = match frame.side.as_deref() {
                    Some("SELL") | Some("sell") => Side::Sell,
                    _ => Side::Buy,
                };

                Some(NormalizedMessage::Trade(TradeEvent {
                    source: Protocol::PolymarketWs,
                    market_id: frame.market_id()?,
                    trade_id: frame.timestamp.clone().unwrap_or_default(),
                    aggressor_side: side,
                    price: parse_decimal(frame.price.as_deref()?)?,
                    size: frame
                        .size
                        .as_deref()
                        .and_then(parse_decimal)
                        .unwrap_or(0.0),
                    timestamp_ns: ts,
                }))
            }
            _ => None,
        }
    }
}

/// Counters describing normalizer throughput
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizerStats {
    pub packets_in: u64,
    pub messages_out: u64,
    pub parse_failures: u64,
    pub unknown_protocol: u64,
}

/// Routes raw packets to the parser registered for their protocol
pub struct PacketNormalizer {
    parsers: HashMap<Protocol, Box<dyn ProtocolParser>>,
    packets_in: AtomicU64,
    messages_out: AtomicU64,
    parse_failures: AtomicU64,
    unknown_protocol: AtomicU64,
}

impl PacketNormalizer {
    /// Build with the default Kalshi and Polymarket parsers registered
    pub fn new() -> Self {
        let mut normalizer = Self::empty();
        normalizer.register_parser(Box::new(KalshiParser));
        normalizer.register_parser(Box::new(PolymarketParser));
        normalizer
    }

    /// Build with no parsers registered
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
            packets_in: AtomicU64::new(0),
            messages_out: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            unknown_protocol: AtomicU64::new(0),
        }
    }

    /// Register (or replace) the parser for a protocol
    pub fn register_parser(&mut self, parser: Box<dyn ProtocolParser>) {
        self.parsers.insert(parser.protocol(), parser);
    }

    /// Normalize one packet. `None` covers both unknown protocols and
    /// unparseable frames; the distinction lives in the stats.
    pub fn normalize(&self, packet: &RawPacket) -> Option<NormalizedMessage> {
        self.packets_in.fetch_add(1, Ordering::Relaxed);

        let parser = match self.parsers.get(&packet.protocol) {
            Some(parser) => parser,
            None => {
                self.unknown_protocol.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match parser.parse(packet) {
            Some(message) => {
                self.messages_out.fetch_add(1, Ordering::Relaxed);
                Some(message)
            }
            None => {
                self.parse_failures.fetch_add(1, Ordering::Relaxed);
                debug!(
                    protocol = %packet.protocol,
                    len = packet.data.len(),
                    "Dropped unparseable packet"
                );
                None
            }
        }
    }

    /// Stats snapshot; reading has no side effects
    pub fn stats(&self) -> NormalizerStats {
        NormalizerStats {
            packets_in: self.packets_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            unknown_protocol: self.unknown_protocol.load(Ordering::Relaxed),
        }
    }
}

impl Default for PacketNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
