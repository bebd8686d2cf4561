//! Market-data pipeline
//!
//! Raw venue packets come in, normalized messages and readable quote/book
//! state come out:
//!
//! ```text
//! RawPacket ──▶ PacketNormalizer ──▶ NormalizedMessage ──▶ MarketDataHandler
//!              (per-protocol parsers)                      (MPSC ring + worker)
//! ```

pub mod handler;
pub mod normalizer;
pub mod types;

pub use handler::{HandlerConfig, HandlerStats, MarketDataHandler};
pub use normalizer::{
    KalshiParser, NormalizerStats, PacketNormalizer, PolymarketParser, ProtocolParser,
};
pub use types::{
    BookLevel, MarketDataUpdate, NormalizedMessage, OrderBookSnapshot, OrderFill, Quote,
    RawPacket, TradeEvent,
};
