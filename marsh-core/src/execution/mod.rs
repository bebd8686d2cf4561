//! Order execution
//!
//! The risk-checked path from an [`OrderRequest`] to venue bytes and
//! back from [`ExecutionReport`]s to order state and positions:
//!
//! ```text
//! submit_order ──risk──▶ MPSC order ring ──order thread──▶ encode + send
//!                                                              │
//! callback ◀──report thread◀── SPSC report ring ◀── venue ◀────┘
//! ```

pub mod engine;
pub mod types;

pub use engine::{EngineConfig, EngineStats, ExecutionEngine};
pub use types::{
    ExecutionReport, JsonOrderEncoder, Order, OrderEncoder, OrderRequest, OrderStatus,
    OrderType, ReportCallback,
};
