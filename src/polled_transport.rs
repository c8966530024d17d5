//! Polled bridge transport
//!
//! Drives a remote-context socket through a [`BridgeClient`]: connect and
//! send become bridge calls, and a fixed-interval poll drains the remote
//! event buffer, replaying buffered events in their original order. Loss
//! of the bridge channel or of remote session state surfaces as a close,
//! so the session layer runs its normal reconnect path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::bridge::{
    BridgeClient, BridgeConnectRequest, BridgeEvent, BridgeMessageKind, BridgeSendRequest,
};
use crate::codec;
use crate::config::{
    DEFAULT_BRIDGE_BUFFER_CAP, DEFAULT_BRIDGE_SLOT, DEFAULT_POLL_INTERVAL_MS,
    EVENT_CHANNEL_CAPACITY,
};
use crate::transport::{TransportAdapter, TransportError, TransportEvent, WirePayload};

/// Close code used when the bridge channel is lost
const CLOSE_ABNORMAL: u16 = 1006;

/// Close code used when the remote context navigated away or reloaded
const CLOSE_GOING_AWAY: u16 = 1001;

/// Polling parameters for a bridged session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Keyed global slot in the remote context
    pub slot: String,
    /// Interval between poll round-trips, in milliseconds
    pub interval_ms: u64,
    /// Bound on the remote event buffer
    pub buffer_cap: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            slot: DEFAULT_BRIDGE_SLOT.to_string(),
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            buffer_cap: DEFAULT_BRIDGE_BUFFER_CAP,
        }
    }
}

/// Transport variant backed by a polled bridge
///
/// One instance serves one connection attempt, like its direct
/// counterpart; the poll loop ends with the close event it emits.
/// Dropping an instance that was never closed aborts the poll loop.
pub struct PolledTransport {
    client: Arc<dyn BridgeClient>,
    config: PollConfig,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl PolledTransport {
    pub fn new(client: Arc<dyn BridgeClient>, config: PollConfig) -> Self {
        Self {
            client,
            config,
            poller: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TransportAdapter for PolledTransport {
    async fn connect(&self, url: &str) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let client = Arc::clone(&self.client);
        let config = self.config.clone();
        let url = url.to_string();
        let handle = tokio::spawn(run_poller(client, config, url, tx));
        *self.poller.lock().await = Some(handle);
        rx
    }

    async fn send(&self, payload: WirePayload) -> Result<(), TransportError> {
        let request = match payload {
            WirePayload::Text(text) => BridgeSendRequest {
                slot: self.config.slot.clone(),
                kind: BridgeMessageKind::Text,
                data: text,
            },
            WirePayload::Binary(bytes) => BridgeSendRequest {
                slot: self.config.slot.clone(),
                kind: BridgeMessageKind::Binary,
                data: codec::bytes_to_base64(&bytes),
            },
        };

        let reply = self
            .client
            .send(&request)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        if reply.ok {
            Ok(())
        } else {
            Err(TransportError::SendFailed(
                reply
                    .error
                    .unwrap_or_else(|| "send rejected by remote socket".to_string()),
            ))
        }
    }

    async fn close(&self, _code: u16, _reason: &str) {
        if let Some(handle) = self.poller.lock().await.take() {
            handle.abort();
        }
        if let Err(e) = self.client.disconnect(&self.config.slot).await {
            debug!(error = %e, "Bridge disconnect failed");
        }
    }
}

impl Drop for PolledTransport {
    fn drop(&mut self) {
        // No disconnect RPC from here; the remote slot stays until the
        // next connect replaces it
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
    }
}

/// Connect the remote slot, then poll its event buffer until the socket
/// closes or the consumer goes away
async fn run_poller(
    client: Arc<dyn BridgeClient>,
    config: PollConfig,
    url: String,
    tx: mpsc::Sender<TransportEvent>,
) {
    let request = BridgeConnectRequest {
        slot: config.slot.clone(),
        url,
        buffer_cap: config.buffer_cap,
    };
    match client.connect(&request).await {
        Ok(ack) if ack.ok => {}
        Ok(_) => {
            emit_failure(&tx, "remote context refused to create the socket".to_string()).await;
            return;
        }
        Err(e) => {
            emit_failure(&tx, format!("bridge connect failed: {e}")).await;
            return;
        }
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(config.interval_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            return;
        }

        let reply = match client.poll(&config.slot).await {
            Ok(reply) => reply,
            Err(e) => {
                emit_failure(&tx, format!("bridge poll failed: {e}")).await;
                return;
            }
        };

        if !reply.has_state {
            debug!(slot = %config.slot, "Remote session state gone");
            let _ = tx
                .send(TransportEvent::Close {
                    code: CLOSE_GOING_AWAY,
                    reason: "remote context reloaded".to_string(),
                })
                .await;
            return;
        }

        trace!(
            ready_state = reply.ready_state,
            events = reply.events.len(),
            "Bridge poll"
        );

        for event in reply.events {
            let closed = matches!(event, BridgeEvent::Close { .. });
            let translated = match event {
                BridgeEvent::Open => TransportEvent::Open,
                BridgeEvent::Error => TransportEvent::Error {
                    message: "remote socket error".to_string(),
                },
                BridgeEvent::Close { code, reason } => TransportEvent::Close { code, reason },
                BridgeEvent::Message { kind, data } => match kind {
                    BridgeMessageKind::Text => TransportEvent::Message(WirePayload::Text(data)),
                    BridgeMessageKind::Binary => match codec::base64_to_bytes(&data) {
                        Ok(bytes) => TransportEvent::Message(WirePayload::Binary(bytes)),
                        Err(e) => {
                            warn!(error = %e, "Undecodable binary frame from bridge");
                            TransportEvent::Error {
                                message: format!("undecodable binary frame: {e}"),
                            }
                        }
                    },
                },
            };
            if tx.send(translated).await.is_err() {
                return;
            }
            // The close event is the last one the remote buffers
            if closed {
                return;
            }
        }
    }
}

async fn emit_failure(tx: &mpsc::Sender<TransportEvent>, message: String) {
    let _ = tx
        .send(TransportEvent::Error {
            message: message.clone(),
        })
        .await;
    let _ = tx
        .send(TransportEvent::Close {
            code: CLOSE_ABNORMAL,
            reason: message,
        })
        .await;
}
