//! Session configuration and default values
//!
//! All defaults live here as documented constants; the config structs in
//! the individual modules reference them from their `Default` impls.

use serde::{Deserialize, Serialize};

use crate::heartbeat::HeartbeatConfig;
use crate::reconnect::ReconnectConfig;
use crate::transport::TransportKind;

/// Message log capacity in entries; oldest entries are evicted past this
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Fixed delay between reconnect attempts (milliseconds)
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3_000;

/// Reconnect attempt budget per session (0 = unlimited)
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Floor applied to configured reconnect delays (milliseconds)
pub const MIN_RECONNECT_DELAY_MS: u64 = 200;

/// Heartbeat interval between beats (milliseconds)
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Floor applied to configured heartbeat intervals (milliseconds)
pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 1_000;

/// Text payload sent as each heartbeat
pub const DEFAULT_HEARTBEAT_PAYLOAD: &str = "ping";

/// Interval between bridge poll round-trips (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 400;

/// Bound on the remote bridge event buffer
pub const DEFAULT_BRIDGE_BUFFER_CAP: usize = 256;

/// Keyed global slot name for the remote-context socket
pub const DEFAULT_BRIDGE_SLOT: &str = "__sonde_socket__";

/// Capacity of the per-transport event channel
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Complete settings for a debug session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Transport variant used by future connects
    pub transport: TransportKind,
    /// Automatic reconnection settings
    pub reconnect: ReconnectConfig,
    /// Heartbeat settings
    pub heartbeat: HeartbeatConfig,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transport variant
    pub fn with_transport(mut self, kind: TransportKind) -> Self {
        self.transport = kind;
        self
    }

    /// Replace the reconnect settings
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Replace the heartbeat settings
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}
