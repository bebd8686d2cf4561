//! Order lifecycle types
//!
//! Orders are created `Pending`, move to `Submitted` when the order
//! thread picks them up, and finish in one of the terminal states.
//! Reports briefly alias an order by `internal_id`; they are applied in
//! arrival order and never reordered.

use std::fmt;
use std::sync::Arc;

use crate::core::{Protocol, Side};

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OrderStatus {
    Pending = 0,
    Submitted,
    Acknowledged,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Error,
}

impl OrderStatus {
    /// Terminal states end the order's lifecycle; the engine evicts the
    /// report callback when one is reached.
    #[inline(always)]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Error
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Acknowledged => "acknowledged",
            OrderStatus::PartiallyFilled => "partially-filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OrderType {
    Market = 0,
    Limit,
    /// Immediate or Cancel
    Ioc,
    /// Fill or Kill
    Fok,
    /// Good Till Cancel
    Gtc,
}

/// Internal order representation
///
/// Owned by the engine's active-order index until terminal; readers get
/// snapshot copies through `get_order`.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Monotonic engine-assigned id
    pub internal_id: u64,
    /// Venue-assigned id, set once known
    pub external_id: String,
    pub market_id: String,
    pub venue: Protocol,

    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,

    pub price: f64,
    pub quantity: f64,
    pub filled_quantity: f64,
    pub avg_fill_price: f64,

    pub created_ns: i64,
    pub submitted_ns: i64,
    pub last_update_ns: i64,

    pub error_message: Option<String>,
}

/// Callback invoked with every execution report for an order
pub type ReportCallback = Arc<dyn Fn(&ExecutionReport) + Send + Sync>;

/// Order submission request
///
/// User intent before the risk check. On rejection the callback receives
/// exactly one `Rejected` report and the request is never retried.
#[derive(Clone)]
pub struct OrderRequest {
    pub market_id: String,
    pub venue: Protocol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: f64,
    pub quantity: f64,

    /// Asynchronous report notifications for this order
    pub on_report: Option<ReportCallback>,
}

impl fmt::Debug for OrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderRequest")
            .field("market_id", &self.market_id)
            .field("venue", &self.venue)
            .field("side", &self.side)
            .field("order_type", &self.order_type)
            .field("price", &self.price)
            .field("quantity", &self.quantity)
            .field("has_callback", &self.on_report.is_some())
            .finish()
    }
}

/// Execution report from a venue
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub order_id: u64,
    pub external_id: String,
    pub status: OrderStatus,

    pub filled_quantity: f64,
    pub fill_price: f64,
    pub remaining_quantity: f64,

    pub timestamp_ns: i64,
    pub message: String,
}

/// Per-venue outbound order serializer
///
/// Treated by the engine as a pure function `Order -> bytes`; no length
/// assumptions.
pub trait OrderEncoder: Send + Sync {
    fn encode(&self, order: &Order) -> Vec<u8>;
}

/// Default JSON record encoder
///
/// Emits `{"id":<u64>,"market":"<str>","side":<0|1>,"price":<f64>,"qty":<f64>}`.
/// Production deployments register venue-specific encoders instead.
#[derive(Debug, Default)]
pub struct JsonOrderEncoder;

impl OrderEncoder for JsonOrderEncoder {
    fn encode(&self, order: &Order) -> Vec<u8> {
        let market = serde_json::to_string(&order.market_id)
            .unwrap_or_else(|_| "\"\"".to_string());
        format!(
            "{{\"id\":{},\"market\":{},\"side\":{},\"price\":{},\"qty\":{}}}",
            order.internal_id, market, order.side as u8, order.price, order.quantity
        )
        .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order {
            internal_id: 7,
            external_id: String::new(),
            market_id: "M1".to_string(),
            venue: Protocol::KalshiWs,
            side: Side::Sell,
            order_type: OrderType::Limit,
            status: OrderStatus::Pending,
            price: 0.52,
            quantity: 25.0,
            filled_quantity: 0.0,
            avg_fill_price: 0.0,
            created_ns: 0,
            submitted_ns: 0,
            last_update_ns: 0,
            error_message: None,
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Error.is_terminal());

        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn test_json_encoder_layout() {
        let bytes = JsonOrderEncoder.encode(&order());
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "{\"id\":7,\"market\":\"M1\",\"side\":1,\"price\":0.52,\"qty\":25}"
        );
    }

    #[test]
    fn test_json_encoder_escapes_market_id() {
        let mut o = order();
        o.market_id = "M\"1".to_string();
        let text = String::from_utf8(JsonOrderEncoder.encode(&o)).unwrap();
        // Output must stay valid JSON
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["market"], "M\"1");
    }

    #[test]
    fn test_status_sizes() {
        assert_eq!(std::mem::size_of::<OrderStatus>(), 1);
        assert_eq!(std::mem::size_of::<OrderType>(), 1);
    }
}
