//! Connection controller
//!
//! The session state machine. Owns the active transport instance, drives
//! the reconnect policy and the heartbeat scheduler, and publishes state
//! changes and messages into the session's [`MessageLog`].
//!
//! Every connection attempt gets a monotonically increasing sequence
//! number. Asynchronous completions (transport events, reconnect timer
//! fires) capture the sequence they were started under and are discarded
//! once the controller has moved on; that comparison is the only
//! cancellation mechanism stale completions need.

use std::fmt;
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::codec;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::heartbeat::{spawn_heartbeat, HeartbeatConfig};
use crate::message_log::{Direction, MessageLog, PayloadKind};
use crate::reconnect::{self, ReconnectConfig, ReconnectDecision};
use crate::transport::{
    DefaultTransportFactory, TransportAdapter, TransportEvent, TransportFactory, TransportKind,
    WirePayload,
};

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket; the session waits for a connect
    #[default]
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// The socket is open
    Connected,
    /// The last attempt or connection failed; a close may still follow
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// Identity of one connection attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Monotonic attempt counter; stale async completions are detected
    /// by comparing against the current value
    pub sequence: u64,
    /// Transport variant of this attempt
    pub transport: TransportKind,
    /// Target WebSocket URL
    pub url: String,
}

/// How an outbound payload is interpreted by [`ConnectionController::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    /// Send verbatim as a text frame
    Text,
    /// Validate as JSON, then send as a text frame
    Json,
    /// Decode to bytes under the given encoding, send as a binary frame
    Binary(BinaryEncoding),
}

/// Input encoding for [`SendMode::Binary`] payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryEncoding {
    Hex,
    Base64,
}

/// Reconnect bookkeeping for the current session
#[derive(Debug, Default)]
struct ReconnectState {
    /// Completed automatic attempts since the last reset
    attempts: u32,
    /// Set by `disconnect`; suppresses reconnect evaluation
    manual_close: bool,
    /// Pending delay timer, if any
    timer: Option<JoinHandle<()>>,
}

struct ControllerState {
    connection: ConnectionState,
    sequence: u64,
    session: Option<Session>,
    transport: Option<Arc<dyn TransportAdapter>>,
    pump: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: ReconnectState,
    config: SessionConfig,
}

impl ControllerState {
    fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect.timer.take() {
            timer.abort();
        }
    }

    fn cancel_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
    }

    fn cancel_timers(&mut self) {
        self.cancel_reconnect_timer();
        self.cancel_heartbeat();
    }

    fn abort_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

struct ControllerInner {
    state: Mutex<ControllerState>,
    log: MessageLog,
    factory: Arc<dyn TransportFactory>,
    self_weak: Weak<ControllerInner>,
}

/// WebSocket debug session state machine
///
/// All methods return quickly; connection outcomes arrive through the
/// [`MessageLog`] and the [`ConnectionController::state`] accessor. The
/// controller owns at most one transport, one reconnect timer, and one
/// heartbeat task at a time, and cancels all three before starting a new
/// attempt.
pub struct ConnectionController {
    inner: Arc<ControllerInner>,
}

impl ConnectionController {
    /// Controller with the default transport factory (direct sockets;
    /// bridged connects fail until a bridge is provided)
    pub fn new(config: SessionConfig, log: MessageLog) -> Self {
        Self::with_factory(config, log, Arc::new(DefaultTransportFactory::new()))
    }

    /// Controller with a host-provided transport factory
    pub fn with_factory(
        config: SessionConfig,
        log: MessageLog,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| ControllerInner {
            state: Mutex::new(ControllerState {
                connection: ConnectionState::Disconnected,
                sequence: 0,
                session: None,
                transport: None,
                pump: None,
                heartbeat: None,
                reconnect: ReconnectState::default(),
                config,
            }),
            log,
            factory,
            self_weak: weak.clone(),
        });
        Self { inner }
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.inner.state.lock().await.connection
    }

    /// Identity of the current connection attempt, if any
    pub async fn session(&self) -> Option<Session> {
        self.inner.state.lock().await.session.clone()
    }

    /// Completed automatic reconnect attempts for the current session
    pub async fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().await.reconnect.attempts
    }

    /// Start a new connection attempt, superseding any current one
    ///
    /// The previous transport is closed silently: no log entry, no
    /// reconnect evaluation. An empty URL fails validation and moves the
    /// session to [`ConnectionState::Error`], cancelling the heartbeat
    /// and any pending reconnect timer but touching no transport.
    pub async fn connect(&self, url: &str, reset_attempts: bool) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            {
                let mut st = self.inner.state.lock().await;
                st.connection = ConnectionState::Error;
                st.cancel_timers();
            }
            self.inner
                .log
                .append(
                    Direction::System,
                    PayloadKind::Text,
                    "connect rejected: URL must not be empty",
                )
                .await;
            return Err(SessionError::Validation("URL must not be empty".to_string()));
        }

        let mut st = self.inner.state.lock().await;
        self.inner
            .begin_attempt(&mut st, url.to_string(), reset_attempts, true)
            .await;
        Ok(())
    }

    /// Close the session and suppress automatic reconnection
    ///
    /// Idempotent: once disconnected, further calls only make sure timers
    /// stay cancelled.
    pub async fn disconnect(&self) {
        let transport = {
            let mut st = self.inner.state.lock().await;
            st.reconnect.manual_close = true;
            st.reconnect.attempts = 0;
            st.cancel_timers();
            st.abort_pump();
            st.connection = ConnectionState::Disconnected;
            st.session = None;
            st.transport.take()
        };

        if let Some(transport) = transport {
            transport.close(1000, "closed by user").await;
            self.inner
                .log
                .append(Direction::System, PayloadKind::Text, "disconnected")
                .await;
            info!("Disconnected by user");
        }
    }

    /// Send one payload over the connected session
    ///
    /// Fails with [`SessionError::NotConnected`] unless the state is
    /// `Connected`, and with [`SessionError::InvalidPayload`] when the
    /// payload does not satisfy the selected mode; neither failure
    /// touches the transport or the log. A transport-level send failure
    /// is logged as a System entry but does not change state by itself.
    pub async fn send(&self, payload: &str, mode: SendMode) -> Result<()> {
        let transport = {
            let st = self.inner.state.lock().await;
            if st.connection != ConnectionState::Connected {
                return Err(SessionError::NotConnected);
            }
            st.transport
                .as_ref()
                .map(Arc::clone)
                .ok_or(SessionError::NotConnected)?
        };

        let (wire, kind) = encode_outbound(payload, mode)?;
        let logged = match &wire {
            WirePayload::Text(text) => text.clone(),
            WirePayload::Binary(bytes) => codec::bytes_to_base64(bytes),
        };

        match transport.send(wire).await {
            Ok(()) => {
                self.inner.log.append(Direction::Out, kind, logged).await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Send failed");
                self.inner
                    .log
                    .append(
                        Direction::System,
                        PayloadKind::Text,
                        format!("send failed: {e}"),
                    )
                    .await;
                Err(SessionError::Transport(e.to_string()))
            }
        }
    }

    /// Replace the heartbeat settings, restarting the scheduler if
    /// currently connected
    pub async fn set_heartbeat(&self, config: HeartbeatConfig) {
        let mut st = self.inner.state.lock().await;
        st.config.heartbeat = config;
        self.inner.restart_heartbeat(&mut st);
    }

    /// Replace the reconnect settings; takes effect at the next close
    pub async fn set_reconnect(&self, config: ReconnectConfig) {
        let mut st = self.inner.state.lock().await;
        st.config.reconnect = config;
    }

    /// Select the transport variant used by future connects
    pub async fn set_transport(&self, kind: TransportKind) {
        let mut st = self.inner.state.lock().await;
        st.config.transport = kind;
    }

    /// Tear the session down without log entries; for host shutdown
    pub async fn shutdown(&self) {
        let transport = {
            let mut st = self.inner.state.lock().await;
            st.reconnect.manual_close = true;
            st.reconnect.attempts = 0;
            st.cancel_timers();
            st.abort_pump();
            st.connection = ConnectionState::Disconnected;
            st.session = None;
            st.transport.take()
        };
        if let Some(transport) = transport {
            transport.close(1001, "session shut down").await;
        }
    }
}

impl ControllerInner {
    /// Start a connection attempt under a fresh sequence number. The
    /// caller holds the state lock.
    async fn begin_attempt(
        &self,
        st: &mut ControllerState,
        url: String,
        reset_attempts: bool,
        manual: bool,
    ) {
        st.sequence += 1;
        let seq = st.sequence;
        st.reconnect.manual_close = false;
        if reset_attempts {
            st.reconnect.attempts = 0;
        }
        st.cancel_timers();
        st.abort_pump();
        let superseded = st.transport.take();

        let kind = st.config.transport;
        st.connection = ConnectionState::Connecting;
        st.session = Some(Session {
            sequence: seq,
            transport: kind,
            url: url.clone(),
        });

        if manual {
            self.log
                .append(
                    Direction::System,
                    PayloadKind::Text,
                    format!("connecting to {url} ({kind})"),
                )
                .await;
        } else {
            self.log
                .append(
                    Direction::System,
                    PayloadKind::Text,
                    format!(
                        "reconnecting to {url} (attempt {})",
                        st.reconnect.attempts
                    ),
                )
                .await;
        }
        info!(%url, %kind, sequence = seq, "Starting connection attempt");

        let transport = self.factory.create(kind);
        st.transport = Some(Arc::clone(&transport));

        let weak = self.self_weak.clone();
        st.pump = Some(tokio::spawn(async move {
            // Old transport first, so bridged slot operations serialize
            if let Some(old) = superseded {
                old.close(1000, "superseded").await;
            }
            let mut events = transport.connect(&url).await;
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.apply_event(seq, event).await;
            }
        }));
    }

    /// Apply one transport event produced under `seq`
    ///
    /// The single entry point for asynchronous completions; events from
    /// superseded attempts are discarded here regardless of content.
    async fn apply_event(&self, seq: u64, event: TransportEvent) {
        let mut st = self.state.lock().await;
        if seq != st.sequence {
            trace!(
                sequence = seq,
                current = st.sequence,
                "Discarding stale transport event"
            );
            return;
        }

        match event {
            TransportEvent::Open => {
                if st.connection != ConnectionState::Connecting {
                    debug!(state = %st.connection, "Ignoring open event");
                    return;
                }
                st.connection = ConnectionState::Connected;
                self.log
                    .append(Direction::System, PayloadKind::Text, "connection established")
                    .await;
                info!(sequence = seq, "Connected");
                self.restart_heartbeat(&mut st);
            }
            TransportEvent::Error { message } => {
                if !matches!(
                    st.connection,
                    ConnectionState::Connecting | ConnectionState::Connected
                ) {
                    debug!(state = %st.connection, "Ignoring error event");
                    return;
                }
                st.connection = ConnectionState::Error;
                st.cancel_heartbeat();
                self.log
                    .append(
                        Direction::System,
                        PayloadKind::Text,
                        format!("transport error: {message}"),
                    )
                    .await;
                warn!(%message, "Transport error");
            }
            TransportEvent::Close { code, reason } => {
                if st.connection == ConnectionState::Disconnected {
                    debug!("Ignoring close event while disconnected");
                    return;
                }
                st.connection = ConnectionState::Disconnected;
                st.cancel_heartbeat();
                st.transport = None;
                let detail = if reason.is_empty() {
                    format!("connection closed (code {code})")
                } else {
                    format!("connection closed (code {code}): {reason}")
                };
                self.log
                    .append(Direction::System, PayloadKind::Text, detail)
                    .await;
                info!(code, %reason, "Connection closed");
                self.evaluate_reconnect(&mut st).await;
            }
            TransportEvent::Message(payload) => {
                if st.connection == ConnectionState::Disconnected {
                    debug!("Ignoring message while disconnected");
                    return;
                }
                let (kind, text) = classify_inbound(payload);
                self.log.append(Direction::In, kind, text).await;
            }
        }
    }

    /// Decide whether to schedule another attempt after a close. The
    /// caller holds the state lock.
    async fn evaluate_reconnect(&self, st: &mut ControllerState) {
        if st.reconnect.manual_close {
            debug!("Manual close; skipping reconnect");
            return;
        }
        let cfg = st.config.reconnect.clone();
        if !cfg.enabled {
            debug!("Auto-reconnect disabled");
            return;
        }

        match reconnect::next_attempt(st.reconnect.attempts, cfg.max_attempts, cfg.interval_ms) {
            ReconnectDecision::Stop => {
                info!(attempts = st.reconnect.attempts, "Reconnect budget exhausted");
                self.log
                    .append(
                        Direction::System,
                        PayloadKind::Text,
                        format!(
                            "giving up after {} reconnect attempts",
                            st.reconnect.attempts
                        ),
                    )
                    .await;
            }
            ReconnectDecision::Delay(delay) => {
                let seq = st.sequence;
                let weak = self.self_weak.clone();
                debug!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
                st.reconnect.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_reconnect_boxed(seq).await;
                    }
                }));
            }
        }
    }

    /// Type-erased [`Self::fire_reconnect`] for the reconnect timer.
    ///
    /// The timer's future reaches `begin_attempt`, which spawns the pump,
    /// which reaches `evaluate_reconnect` and the timer again; boxing
    /// here breaks that cycle of opaque future types.
    fn fire_reconnect_boxed(&self, seq: u64) -> BoxFuture<'_, ()> {
        Box::pin(self.fire_reconnect(seq))
    }

    /// Reconnect timer completion for the attempt sequence `seq`
    async fn fire_reconnect(&self, seq: u64) {
        let mut st = self.state.lock().await;
        if seq != st.sequence {
            trace!(sequence = seq, "Discarding stale reconnect timer");
            return;
        }
        if st.reconnect.manual_close || st.connection != ConnectionState::Disconnected {
            debug!(state = %st.connection, "Reconnect timer no longer applicable");
            return;
        }
        let Some(url) = st.session.as_ref().map(|s| s.url.clone()) else {
            return;
        };
        st.reconnect.attempts += 1;
        self.begin_attempt(&mut st, url, false, false).await;
    }

    /// Tear down and, if connected and enabled, restart the heartbeat.
    /// The caller holds the state lock.
    fn restart_heartbeat(&self, st: &mut ControllerState) {
        st.cancel_heartbeat();
        if st.connection != ConnectionState::Connected || !st.config.heartbeat.enabled {
            return;
        }
        if let Some(transport) = &st.transport {
            st.heartbeat = Some(spawn_heartbeat(Arc::clone(transport), &st.config.heartbeat));
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let st = self.state.get_mut();
        st.cancel_timers();
        st.abort_pump();
    }
}

/// Map an outbound payload and mode to its wire form and log kind
fn encode_outbound(payload: &str, mode: SendMode) -> Result<(WirePayload, PayloadKind)> {
    match mode {
        SendMode::Text => Ok((WirePayload::Text(payload.to_string()), PayloadKind::Text)),
        SendMode::Json => {
            serde_json::from_str::<serde_json::Value>(payload)
                .map_err(|e| SessionError::InvalidPayload(format!("invalid JSON: {e}")))?;
            Ok((WirePayload::Text(payload.to_string()), PayloadKind::Json))
        }
        SendMode::Binary(encoding) => {
            let bytes = match encoding {
                BinaryEncoding::Hex => codec::hex_to_bytes(payload)?,
                BinaryEncoding::Base64 => codec::base64_to_bytes(payload)?,
            };
            Ok((WirePayload::Binary(bytes), PayloadKind::Binary))
        }
    }
}

/// Classify an inbound payload for the log; text that parses as JSON is
/// marked as such, binary is stored base64-encoded
fn classify_inbound(payload: WirePayload) -> (PayloadKind, String) {
    match payload {
        WirePayload::Text(text) => {
            if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
                (PayloadKind::Json, text)
            } else {
                (PayloadKind::Text, text)
            }
        }
        WirePayload::Binary(bytes) => (PayloadKind::Binary, codec::bytes_to_base64(&bytes)),
    }
}
