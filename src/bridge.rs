//! Bridge RPC contract for remote-context sockets
//!
//! When the real socket lives in a separate execution context (for
//! example an inspected page), the session reaches it through an
//! out-of-band expression-evaluation channel. This module defines that
//! contract: the JSON shapes exchanged with the remote side, and the
//! [`BridgeClient`] trait a host implements to provide the channel.
//!
//! The remote side keeps the socket in a keyed global slot together with
//! a bounded event buffer; the polled transport drains that buffer at a
//! fixed interval and replays the events in their original order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Creates or replaces the keyed socket slot in the remote context
///
/// The remote side force-closes any socket already in the slot before
/// opening the new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConnectRequest {
    /// Keyed global slot that owns the socket in the remote context
    pub slot: String,
    /// Target WebSocket URL
    pub url: String,
    /// Bound on the remote event buffer between polls
    pub buffer_cap: usize,
}

/// Acknowledgement returned by connect and disconnect calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeAck {
    pub ok: bool,
}

/// Result of one poll round-trip
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgePollReply {
    /// False when the remote context lost its session state (reload)
    pub has_state: bool,
    /// Remote socket readyState (0 connecting, 1 open, 2 closing, 3 closed)
    pub ready_state: i32,
    /// Buffered events in production order
    #[serde(default)]
    pub events: Vec<BridgeEvent>,
}

/// A buffered remote socket event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BridgeEvent {
    Open,
    Error,
    Close { code: u16, reason: String },
    Message { kind: BridgeMessageKind, data: String },
}

/// Payload kind of a bridged message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMessageKind {
    Text,
    Binary,
}

/// Outbound send pushed to the remote socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSendRequest {
    pub slot: String,
    pub kind: BridgeMessageKind,
    /// Text payloads verbatim; binary payloads base64-encoded
    pub data: String,
}

/// Outcome of a send call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSendReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Errors from the bridge channel itself, not from the remote socket
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    #[error("Bridge channel unavailable: {0}")]
    Unavailable(String),

    #[error("Bridge call failed: {0}")]
    CallFailed(String),

    #[error("Bridge reply malformed: {0}")]
    Malformed(String),
}

/// Request/response channel into the execution context that owns the
/// socket
///
/// Hosts implement this over whatever evaluation mechanism they have: a
/// devtools eval channel, a local IPC socket, a test double. Calls may be
/// dropped mid-flight when the session shuts down, so implementations
/// must tolerate abandoned futures.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    /// Create or replace the remote socket slot
    async fn connect(&self, request: &BridgeConnectRequest) -> Result<BridgeAck, BridgeError>;

    /// Drain the remote event buffer
    async fn poll(&self, slot: &str) -> Result<BridgePollReply, BridgeError>;

    /// Push one outbound payload to the remote socket
    async fn send(&self, request: &BridgeSendRequest) -> Result<BridgeSendReply, BridgeError>;

    /// Close and clear the remote socket slot
    async fn disconnect(&self, slot: &str) -> Result<BridgeAck, BridgeError>;
}

/// Bridge client used when no channel is configured
///
/// Every call fails, which the polled transport surfaces as an immediate
/// close.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredBridge;

#[async_trait]
impl BridgeClient for UnconfiguredBridge {
    async fn connect(&self, _request: &BridgeConnectRequest) -> Result<BridgeAck, BridgeError> {
        Err(BridgeError::Unavailable(
            "no bridge channel configured".to_string(),
        ))
    }

    async fn poll(&self, _slot: &str) -> Result<BridgePollReply, BridgeError> {
        Err(BridgeError::Unavailable(
            "no bridge channel configured".to_string(),
        ))
    }

    async fn send(&self, _request: &BridgeSendRequest) -> Result<BridgeSendReply, BridgeError> {
        Err(BridgeError::Unavailable(
            "no bridge channel configured".to_string(),
        ))
    }

    async fn disconnect(&self, _slot: &str) -> Result<BridgeAck, BridgeError> {
        Err(BridgeError::Unavailable(
            "no bridge channel configured".to_string(),
        ))
    }
}
