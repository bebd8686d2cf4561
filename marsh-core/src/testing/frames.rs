//! Kalshi wire-frame builders
//!
//! Encode normalized values back into the binary frame layout the parser
//! consumes. Used for parser round-trip tests and by the simulated feed
//! in `marsh-bins`.

use crate::core::Side;
use crate::data::normalizer::KalshiParser;

fn header(msg_type: u16, sequence: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(64);
    frame.extend_from_slice(&msg_type.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes()); // flags
    frame.extend_from_slice(&sequence.to_be_bytes());
    frame
}

fn push_market_id(frame: &mut Vec<u8>, market_id: &str) {
    let mut field = [0u8; 16];
    let bytes = market_id.as_bytes();
    let len = bytes.len().min(16);
    field[..len].copy_from_slice(&bytes[..len]);
    frame.extend_from_slice(&field);
}

/// Build a quote frame (msg_type 0x0001)
pub fn kalshi_quote(
    market_id: &str,
    sequence: u32,
    bid_price: f64,
    ask_price: f64,
    bid_size: f64,
    ask_size: f64,
) -> Vec<u8> {
    let mut frame = header(KalshiParser::MSG_QUOTE, sequence);
    push_market_id(&mut frame, market_id);
    frame.extend_from_slice(&bid_price.to_be_bytes());
    frame.extend_from_slice(&ask_price.to_be_bytes());
    frame.extend_from_slice(&bid_size.to_be_bytes());
    frame.extend_from_slice(&ask_size.to_be_bytes());
    frame
}

/// Build a trade frame (msg_type 0x0002)
pub fn kalshi_trade(
    market_id: &str,
    sequence: u32,
    aggressor: Side,
    price: f64,
    size: f64,
) -> Vec<u8> {
    let mut frame = header(KalshiParser::MSG_TRADE, sequence);
    push_market_id(&mut frame, market_id);
    frame.push(match aggressor {
        Side::Buy => 0,
        Side::Sell => 1,
    });
    frame.resize(32, 0); // pad to the price offset
    frame.extend_from_slice(&price.to_be_bytes());
    frame.extend_from_slice(&size.to_be_bytes());
    frame
}

/// Build a book snapshot frame (msg_type 0x0003)
pub fn kalshi_book(
    market_id: &str,
    sequence: u32,
    bids: &[(f64, f64)],
    asks: &[(f64, f64)],
) -> Vec<u8> {
    let mut frame = header(KalshiParser::MSG_BOOK, sequence);
    push_market_id(&mut frame, market_id);
    frame.extend_from_slice(&(bids.len() as u16).to_be_bytes());
    frame.extend_from_slice(&(asks.len() as u16).to_be_bytes());
    for &(price, size) in bids.iter().chain(asks.iter()) {
        frame.extend_from_slice(&price.to_be_bytes());
        frame.extend_from_slice(&size.to_be_bytes());
    }
    frame
}
