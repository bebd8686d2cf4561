//! Market connection interface and pool
//!
//! Contracts the core relies on: `send(bytes)`, a `state()` observer,
//! and an inbound-packet callback. Authentication, reconnect policy, and
//! timeouts are the connection's own business.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::Protocol;
use crate::data::types::RawPacket;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// Connection configuration record
///
/// Plain options supplied at construction; the core never reads the
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub port: u16,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub api_key: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub api_secret: String,

    pub connect_timeout_ms: u32,
    pub read_timeout_ms: u32,
    pub write_timeout_ms: u32,
    pub heartbeat_interval_ms: u32,

    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            port: 0,
            api_key: String::new(),
            api_secret: String::new(),
            connect_timeout_ms: 5_000,
            read_timeout_ms: 1_000,
            write_timeout_ms: 1_000,
            heartbeat_interval_ms: 30_000,
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1_000,
        }
    }
}

pub type DataCallback = Box<dyn Fn(RawPacket) + Send + Sync>;
pub type StateCallback = Box<dyn Fn(ConnectionState) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(i32, &str) + Send + Sync>;

/// Abstract market connection
///
/// Implementations use interior mutability; the engine holds shared
/// `Arc<dyn MarketConnection>` handles and calls from its worker threads.
pub trait MarketConnection: Send + Sync {
    fn protocol(&self) -> Protocol;
    fn state(&self) -> ConnectionState;

    fn connect(&self) -> bool;
    fn disconnect(&self);

    /// Queue bytes for the venue. `false` when not connected.
    fn send(&self, data: &[u8]) -> bool;

    fn subscribe(&self, channel: &str, symbol: Option<&str>);
    fn unsubscribe(&self, channel: &str, symbol: Option<&str>);

    fn set_data_callback(&self, cb: DataCallback);
    fn set_state_callback(&self, cb: StateCallback);
    fn set_error_callback(&self, cb: ErrorCallback);
}

/// Pool of owned connections, looked up by protocol
pub struct ConnectionPool {
    max_connections: usize,
    connections: Mutex<Vec<Arc<dyn MarketConnection>>>,
}

impl ConnectionPool {
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Add a connection; ignored beyond `max_connections`
    pub fn add(&self, conn: Arc<dyn MarketConnection>) {
        let mut connections = self.connections.lock();
        if connections.len() < self.max_connections {
            connections.push(conn);
        }
    }

    /// First connected connection for the protocol
    pub fn get(&self, protocol: Protocol) -> Option<Arc<dyn MarketConnection>> {
        self.connections
            .lock()
            .iter()
            .find(|c| c.protocol() == protocol && c.state() == ConnectionState::Connected)
            .cloned()
    }

    pub fn connect_all(&self) {
        for conn in self.connections.lock().iter() {
            if conn.state() == ConnectionState::Disconnected {
                conn.connect();
            }
        }
    }

    pub fn disconnect_all(&self) {
        for conn in self.connections.lock().iter() {
            conn.disconnect();
        }
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn connected_count(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|c| c.state() == ConnectionState::Connected)
            .count()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(10)
    }
}

/// In-memory connection for tests and paper trading
///
/// Behaves like a healthy venue link: connect/disconnect flip the state
/// and notify, sent frames are captured for inspection, and inbound
/// packets can be replayed through the data callback.
pub struct SimulatedConnection {
    protocol: Protocol,
    config: ConnectionConfig,
    state: RwLock<ConnectionState>,
    sent: Mutex<Vec<Vec<u8>>>,
    subscriptions: Mutex<Vec<String>>,

    data_callback: RwLock<Option<DataCallback>>,
    state_callback: RwLock<Option<StateCallback>>,
    error_callback: RwLock<Option<ErrorCallback>>,
}

impl SimulatedConnection {
    pub fn new(protocol: Protocol, config: ConnectionConfig) -> Self {
        Self {
            protocol,
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            sent: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            data_callback: RwLock::new(None),
            state_callback: RwLock::new(None),
            error_callback: RwLock::new(None),
        }
    }

    fn transition(&self, state: ConnectionState) {
        *self.state.write() = state;
        if let Some(cb) = self.state_callback.read().as_ref() {
            cb(state);
        }
    }

    /// Frames sent so far (oldest first)
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Active channel subscriptions
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    /// Replay an inbound packet through the data callback, as the real
    /// transport's receive loop would
    pub fn inject_packet(&self, packet: RawPacket) {
        if let Some(cb) = self.data_callback.read().as_ref() {
            cb(packet);
        }
    }

    /// Raise an error through the error callback
    pub fn inject_error(&self, code: i32, message: &str) {
        if let Some(cb) = self.error_callback.read().as_ref() {
            cb(code, message);
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl MarketConnection for SimulatedConnection {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn connect(&self) -> bool {
        self.transition(ConnectionState::Connecting);
        self.transition(ConnectionState::Connected);
        info!(protocol = %self.protocol, "Simulated connection up");
        true
    }

    fn disconnect(&self) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        self.transition(ConnectionState::Disconnected);
    }

    fn send(&self, data: &[u8]) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        self.sent.lock().push(data.to_vec());
        true
    }

    fn subscribe(&self, channel: &str, symbol: Option<&str>) {
        let key = match symbol {
            Some(symbol) => format!("{}:{}", channel, symbol),
            None => channel.to_string(),
        };
        self.subscriptions.lock().push(key);
    }

    fn unsubscribe(&self, channel: &str, symbol: Option<&str>) {
        let key = match symbol {
            Some(symbol) => format!("{}:{}", channel, symbol),
            None => channel.to_string(),
        };
        self.subscriptions.lock().retain(|s| s != &key);
    }

    fn set_data_callback(&self, cb: DataCallback) {
        *self.data_callback.write() = Some(cb);
    }

    fn set_state_callback(&self, cb: StateCallback) {
        *self.state_callback.write() = Some(cb);
    }

    fn set_error_callback(&self, cb: ErrorCallback) {
        *self.error_callback.write() = Some(cb);
    }
}
