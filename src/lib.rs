//! Sonde Core Library
//!
//! Shared functionality for Sonde WebSocket debug sessions:
//! - Connection controller and session state machine
//! - Direct and bridged (polled) socket transports
//! - Automatic reconnection and heartbeat scheduling
//! - Bounded message log with filtered queries
//! - Payload codecs (hex, base64, previews)

pub mod bridge;
pub mod codec;
pub mod config;
pub mod controller;
pub mod direct_transport;
pub mod error;
pub mod heartbeat;
pub mod message_log;
pub mod polled_transport;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use bridge::{BridgeClient, BridgeError, UnconfiguredBridge};
pub use config::SessionConfig;
pub use controller::{BinaryEncoding, ConnectionController, ConnectionState, SendMode, Session};
pub use error::{Result, SessionError};
pub use heartbeat::HeartbeatConfig;
pub use message_log::{Direction, LogEntry, LogFilter, MessageLog, PayloadKind};
pub use polled_transport::PollConfig;
pub use reconnect::{ReconnectConfig, ReconnectDecision};
pub use transport::{
    DefaultTransportFactory, TransportAdapter, TransportError, TransportEvent, TransportFactory,
    TransportKind, WirePayload,
};
