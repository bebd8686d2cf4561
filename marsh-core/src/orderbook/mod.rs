//! Per-market order books
//!
//! Sorted bid/ask ladders maintained by the market-data handler. Books
//! are keyed on fixed-point prices so ordering is exact; f64 crosses the
//! boundary only at the API surface.

pub mod book;

pub use book::{BookSide, BookView, OrderBook};
