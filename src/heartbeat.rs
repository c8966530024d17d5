//! Connection heartbeats
//!
//! Periodic application-level pings sent while a session is connected.
//! Heartbeats bypass the message log and their send failures are
//! swallowed; only transport close/error events end a connection.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::config::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_PAYLOAD, MIN_HEARTBEAT_INTERVAL_MS,
};
use crate::transport::{TransportAdapter, WirePayload};

/// Heartbeat settings; active only while the session is connected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Master switch
    pub enabled: bool,
    /// Interval between beats, in milliseconds
    pub interval_ms: u64,
    /// Text payload sent as each beat
    pub payload: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            payload: DEFAULT_HEARTBEAT_PAYLOAD.to_string(),
        }
    }
}

impl HeartbeatConfig {
    /// Configured interval with the [`MIN_HEARTBEAT_INTERVAL_MS`] floor
    /// applied
    pub fn effective_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MIN_HEARTBEAT_INTERVAL_MS))
    }
}

/// Spawn the heartbeat loop for one connected transport
///
/// The first beat fires one full interval after spawn, then once per
/// interval. The caller owns the returned handle and aborts it on every
/// connection-state or config change. Send failures are swallowed.
pub(crate) fn spawn_heartbeat(
    transport: Arc<dyn TransportAdapter>,
    config: &HeartbeatConfig,
) -> JoinHandle<()> {
    let period = config.effective_interval();
    let payload = config.payload.clone();
    // Anchor the first beat to spawn time, not to when the task first runs
    let start = tokio::time::Instant::now() + period;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(start, period);
        loop {
            ticker.tick().await;
            trace!("heartbeat");
            let _ = transport.send(WirePayload::Text(payload.clone())).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportError, TransportEvent};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct CountingTransport {
        sent: Mutex<Vec<WirePayload>>,
        fail: AtomicBool,
    }

    impl CountingTransport {
        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TransportAdapter for CountingTransport {
        async fn connect(&self, _url: &str) -> mpsc::Receiver<TransportEvent> {
            let (_tx, rx) = mpsc::channel(1);
            rx
        }

        async fn send(&self, payload: WirePayload) -> Result<(), TransportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::NotOpen);
            }
            self.sent.lock().unwrap().push(payload);
            Ok(())
        }

        async fn close(&self, _code: u16, _reason: &str) {}
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_beat_per_interval() {
        let transport = Arc::new(CountingTransport::default());
        let config = HeartbeatConfig {
            enabled: true,
            interval_ms: 1_000,
            payload: "ping".to_string(),
        };
        let handle = spawn_heartbeat(transport.clone(), &config);
        settle().await;

        // Nothing before the first full interval
        tokio::time::advance(Duration::from_millis(999)).await;
        settle().await;
        assert_eq!(transport.sent_count(), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(transport.sent_count(), 1);

        tokio::time::advance(Duration::from_millis(2_000)).await;
        settle().await;
        assert_eq!(transport.sent_count(), 3);
        assert_eq!(
            *transport.sent.lock().unwrap().first().unwrap(),
            WirePayload::Text("ping".to_string())
        );

        handle.abort();
        tokio::time::advance(Duration::from_millis(10_000)).await;
        settle().await;
        assert_eq!(transport.sent_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_anchored_at_spawn() {
        let transport = Arc::new(CountingTransport::default());
        let config = HeartbeatConfig {
            enabled: true,
            interval_ms: 1_000,
            payload: "ping".to_string(),
        };
        let handle = spawn_heartbeat(transport.clone(), &config);

        // Advance the clock before the task ever runs; the first beat is
        // still due one interval after spawn, not one after first poll
        tokio::time::advance(Duration::from_millis(1_000)).await;
        settle().await;
        assert_eq!(transport.sent_count(), 1);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        settle().await;
        assert_eq!(transport.sent_count(), 2);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failures_are_swallowed() {
        let transport = Arc::new(CountingTransport::default());
        transport.fail.store(true, Ordering::SeqCst);
        let config = HeartbeatConfig {
            enabled: true,
            interval_ms: 1_000,
            payload: "ping".to_string(),
        };
        let handle = spawn_heartbeat(transport.clone(), &config);
        settle().await;

        tokio::time::advance(Duration::from_millis(5_000)).await;
        settle().await;

        // The loop survives failed sends
        assert!(!handle.is_finished());
        assert_eq!(transport.sent_count(), 0);
        handle.abort();
    }

    #[test]
    fn test_effective_interval_floor() {
        let config = HeartbeatConfig {
            enabled: true,
            interval_ms: 10,
            payload: "p".to_string(),
        };
        assert_eq!(config.effective_interval(), Duration::from_millis(1_000));

        let config = HeartbeatConfig {
            interval_ms: 2_500,
            ..config
        };
        assert_eq!(config.effective_interval(), Duration::from_millis(2_500));
    }

    #[test]
    fn test_config_default() {
        let config = HeartbeatConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval_ms, 30_000);
        assert_eq!(config.payload, "ping");
    }
}
