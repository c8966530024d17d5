//! Direct WebSocket transport
//!
//! Wraps a `tokio-tungstenite` client socket running in this process.
//! The handshake and read loop run on a background task so `connect`
//! returns immediately; outcomes arrive as events, mirroring the bridged
//! variant's surface. Binary frames are delivered as raw byte buffers;
//! ping/pong frames are transport noise and are not surfaced.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::config::EVENT_CHANNEL_CAPACITY;
use crate::transport::{TransportAdapter, TransportError, TransportEvent, WirePayload};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Close code reported when the socket ends without a close frame
const CLOSE_ABNORMAL: u16 = 1006;

/// Close code reported when the peer's close frame carried no status
const CLOSE_NO_STATUS: u16 = 1005;

/// Transport variant wrapping an in-process WebSocket client
///
/// One instance serves one connection attempt; `send` works between the
/// `Open` event and the close. Dropping an instance that was never
/// closed aborts the reader task.
pub struct DirectSocketTransport {
    sink: Arc<Mutex<Option<WsSink>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl DirectSocketTransport {
    pub fn new() -> Self {
        Self {
            sink: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
        }
    }
}

impl Default for DirectSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportAdapter for DirectSocketTransport {
    async fn connect(&self, url: &str) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let sink_slot = Arc::clone(&self.sink);
        let url = url.to_string();

        let handle = tokio::spawn(async move {
            let ws = match connect_async(url.as_str()).await {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    let message = format!("connect failed: {e}");
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
                    return;
                }
            };

            let (sink, mut stream) = ws.split();
            *sink_slot.lock().await = Some(sink);
            if tx.send(TransportEvent::Open).await.is_err() {
                sink_slot.lock().await.take();
                return;
            }

            // None = consumer gone, no close event wanted
            let mut close_event = Some((CLOSE_ABNORMAL, "connection lost".to_string()));
            loop {
                let Some(item) = stream.next().await else {
                    break;
                };
                match item {
                    Ok(Message::Text(text)) => {
                        if tx
                            .send(TransportEvent::Message(WirePayload::Text(text)))
                            .await
                            .is_err()
                        {
                            close_event = None;
                            break;
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        if tx
                            .send(TransportEvent::Message(WirePayload::Binary(data)))
                            .await
                            .is_err()
                        {
                            close_event = None;
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        close_event = Some(match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                            None => (CLOSE_NO_STATUS, String::new()),
                        });
                        break;
                    }
                    Ok(_) => {} // ping/pong/raw frames
                    Err(e) => {
                        let _ = tx
                            .send(TransportEvent::Error {
                                message: format!("socket error: {e}"),
                            })
                            .await;
                        close_event = Some((CLOSE_ABNORMAL, e.to_string()));
                        break;
                    }
                }
            }

            sink_slot.lock().await.take();
            if let Some((code, reason)) = close_event {
                let _ = tx.send(TransportEvent::Close { code, reason }).await;
            }
        });

        *self.reader.lock().await = Some(handle);
        rx
    }

    async fn send(&self, payload: WirePayload) -> Result<(), TransportError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotOpen)?;
        let message = match payload {
            WirePayload::Text(text) => Message::Text(text),
            WirePayload::Binary(bytes) => Message::Binary(bytes),
        };
        sink.send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&self, code: u16, reason: &str) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            };
            debug!(code, reason, "Closing socket");
            let _ = sink.send(Message::Close(Some(frame))).await;
            let _ = sink.close().await;
        }
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
    }
}

impl Drop for DirectSocketTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn recv(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event stream ended early")
    }

    /// Echo server accepting a single connection
    async fn spawn_echo_server() -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                    while let Some(Ok(message)) = ws.next().await {
                        match message {
                            Message::Text(text) => {
                                if ws.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            Message::Binary(data) => {
                                if ws.send(Message::Binary(data)).await.is_err() {
                                    break;
                                }
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                }
            }
        });
        (format!("ws://{addr}"), handle)
    }

    #[tokio::test]
    async fn test_connect_echo_and_close() {
        let (url, server) = spawn_echo_server().await;
        let transport = DirectSocketTransport::new();
        let mut rx = transport.connect(&url).await;

        assert_eq!(recv(&mut rx).await, TransportEvent::Open);

        transport
            .send(WirePayload::Text("hello".to_string()))
            .await
            .unwrap();
        assert_eq!(
            recv(&mut rx).await,
            TransportEvent::Message(WirePayload::Text("hello".to_string()))
        );

        transport
            .send(WirePayload::Binary(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(
            recv(&mut rx).await,
            TransportEvent::Message(WirePayload::Binary(vec![1, 2, 3]))
        );

        transport.close(1000, "bye").await;
        // Reader is torn down with the socket; drain anything it queued
        // before the teardown landed
        loop {
            match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(None) => break,
                Ok(Some(_)) => continue,
                Err(_) => panic!("event stream did not end after close"),
            }
        }
        server.abort();
    }

    #[tokio::test]
    async fn test_server_close_frame_is_surfaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "server done".into(),
            }))
            .await
            .unwrap();
        });

        let transport = DirectSocketTransport::new();
        let mut rx = transport.connect(&url).await;

        assert_eq!(recv(&mut rx).await, TransportEvent::Open);
        assert_eq!(
            recv(&mut rx).await,
            TransportEvent::Close {
                code: 1000,
                reason: "server done".to_string(),
            }
        );
        server.abort();
    }

    #[tokio::test]
    async fn test_abrupt_server_drop_is_abnormal_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Complete the handshake, then drop the TCP stream
            let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        });

        let transport = DirectSocketTransport::new();
        let mut rx = transport.connect(&url).await;

        assert_eq!(recv(&mut rx).await, TransportEvent::Open);
        loop {
            match recv(&mut rx).await {
                TransportEvent::Error { .. } => continue,
                TransportEvent::Close { code, .. } => {
                    assert_eq!(code, 1006);
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        server.abort();
    }

    #[tokio::test]
    async fn test_connect_failure_emits_error_then_close() {
        // Grab an ephemeral port, then close the listener
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let transport = DirectSocketTransport::new();
        let mut rx = transport.connect(&url).await;

        assert!(matches!(recv(&mut rx).await, TransportEvent::Error { .. }));
        assert!(matches!(
            recv(&mut rx).await,
            TransportEvent::Close { code: 1006, .. }
        ));
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let transport = DirectSocketTransport::new();
        let result = transport.send(WirePayload::Text("x".to_string())).await;
        assert!(matches!(result, Err(TransportError::NotOpen)));
    }

    #[tokio::test]
    async fn test_drop_without_close_stops_reader() {
        let (url, server) = spawn_echo_server().await;
        let transport = DirectSocketTransport::new();
        let mut rx = transport.connect(&url).await;
        assert_eq!(recv(&mut rx).await, TransportEvent::Open);

        drop(transport);
        // The reader holds the only sender; the stream must end
        loop {
            match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(None) => break,
                Ok(Some(_)) => continue,
                Err(_) => panic!("event stream did not end after drop"),
            }
        }
        server.abort();
    }
}
