//! Venue connection abstraction
//!
//! The core never opens sockets. Every venue is reached through the
//! [`MarketConnection`] trait; the concrete transport (websocket, REST
//! poller, FIX bridge) lives outside and honors its own timeouts.

pub mod connection;

pub use connection::{
    ConnectionConfig, ConnectionPool, ConnectionState, DataCallback, ErrorCallback,
    MarketConnection, SimulatedConnection, StateCallback,
};
