//! Transport abstraction for debug sessions
//!
//! A session talks to its WebSocket through a [`TransportAdapter`]: either
//! a socket opened directly in this process, or a socket owned by a remote
//! execution context and reached through a polled bridge. Both variants
//! present the same surface, so the connection controller never branches
//! on which one is active; construction goes through a [`TransportFactory`]
//! and that is the only place the two are told apart.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bridge::{BridgeClient, UnconfiguredBridge};
use crate::direct_transport::DirectSocketTransport;
use crate::polled_transport::{PollConfig, PolledTransport};

/// Which transport variant a session uses
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Socket opened directly in this process
    #[default]
    Direct,
    /// Socket owned by a remote execution context, reached through a bridge
    Bridged,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Direct => write!(f, "direct"),
            TransportKind::Bridged => write!(f, "bridged"),
        }
    }
}

/// A single payload travelling over a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePayload {
    /// Text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
}

/// Events emitted by a transport instance
///
/// Each instance delivers its events in production order: `Open` first on
/// success, `Message`s while open, and `Close` last. An `Error` may appear
/// at any point and does not by itself end the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The socket finished its handshake and is open
    Open,
    /// The transport observed an error; a close may follow
    Error { message: String },
    /// The socket closed; no further events follow
    Close { code: u16, reason: String },
    /// An inbound frame
    Message(WirePayload),
}

/// Errors from transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport is not open")]
    NotOpen,

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

impl From<TransportError> for String {
    fn from(err: TransportError) -> String {
        err.to_string()
    }
}

/// Common surface for both transport variants
///
/// `connect` starts the attempt and returns the instance's event stream
/// immediately; the outcome arrives on that stream. A transport instance
/// serves a single connection attempt and is discarded after its close.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Begin connecting to `url`; events for this instance arrive on the
    /// returned receiver
    async fn connect(&self, url: &str) -> mpsc::Receiver<TransportEvent>;

    /// Send one payload over the open socket
    async fn send(&self, payload: WirePayload) -> Result<(), TransportError>;

    /// Close the socket and release transport resources; safe to call in
    /// any state
    async fn close(&self, code: u16, reason: &str);
}

/// Builds a fresh transport instance per connection attempt
///
/// The controller is transport-agnostic; implementations of this trait are
/// the single place where [`TransportKind`] variants are told apart.
pub trait TransportFactory: Send + Sync {
    fn create(&self, kind: TransportKind) -> Arc<dyn TransportAdapter>;
}

/// Default factory: direct sockets in-process, bridged sockets through a
/// host-provided [`BridgeClient`]
///
/// Without a bridge client, bridged connects fail immediately and surface
/// as a close, which keeps the controller's behavior uniform.
pub struct DefaultTransportFactory {
    bridge: Arc<dyn BridgeClient>,
    poll: PollConfig,
}

impl DefaultTransportFactory {
    /// Factory with no bridge channel configured
    pub fn new() -> Self {
        Self {
            bridge: Arc::new(UnconfiguredBridge),
            poll: PollConfig::default(),
        }
    }

    /// Factory with a host-provided bridge channel for the bridged variant
    pub fn with_bridge(bridge: Arc<dyn BridgeClient>, poll: PollConfig) -> Self {
        Self { bridge, poll }
    }
}

impl Default for DefaultTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, kind: TransportKind) -> Arc<dyn TransportAdapter> {
        match kind {
            TransportKind::Direct => Arc::new(DirectSocketTransport::new()),
            TransportKind::Bridged => Arc::new(PolledTransport::new(
                Arc::clone(&self.bridge),
                self.poll.clone(),
            )),
        }
    }
}
