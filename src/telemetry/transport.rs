//! Telemetry socket transports
//!
//! [`TelemetryTransport`] is a full-duplex text pipe. Sending and receiving
//! lock different halves, so a task parked in [`recv`](TelemetryTransport::recv)
//! never blocks a stop-watch or variable write going out.
//!
//! - [`WebSocketTransport`] - tokio-tungstenite client for the real service
//! - [`LoopbackTransport`] - in-process pipe driven by a [`LoopbackPeer`]

use crate::config::TelemetryConfig;
use crate::error::{ConsoleError, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// What a transport delivered
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One text frame
    Text(String),
    /// The peer closed the socket, optionally with a reason
    Closed(Option<String>),
}

/// A full-duplex text socket
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    /// Send one text frame
    async fn send(&self, text: String) -> Result<()>;

    /// Wait for the next frame; returns `Closed` once the socket is gone
    async fn recv(&self) -> Result<TransportEvent>;

    /// Close the socket; further sends fail
    async fn close(&self);
}

/// Opens a transport for a device session
#[async_trait]
pub trait TelemetryConnector: Send + Sync {
    async fn open(&self, session_id: &str) -> Result<Arc<dyn TelemetryTransport>>;
}

// ==================== WebSocket ====================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Telemetry over a WebSocket
pub struct WebSocketTransport {
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    stream: tokio::sync::Mutex<SplitStream<WsStream>>,
}

impl WebSocketTransport {
    /// Connect to `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let url = url::Url::parse(url)
            .map_err(|e| ConsoleError::Channel(format!("invalid socket url '{}': {}", url, e)))?;
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ConsoleError::Channel(format!("cannot open telemetry socket: {}", e)))?;
        info!("Telemetry socket open: {}", url);

        let (sink, stream) = ws.split();
        Ok(Self {
            sink: tokio::sync::Mutex::new(sink),
            stream: tokio::sync::Mutex::new(stream),
        })
    }
}

#[async_trait]
impl TelemetryTransport for WebSocketTransport {
    async fn send(&self, text: String) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| ConsoleError::Channel(format!("send failed: {}", e)))
    }

    async fn recv(&self) -> Result<TransportEvent> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(TransportEvent::Text(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(TransportEvent::Text(text)),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty());
                    return Ok(TransportEvent::Closed(reason));
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return Ok(TransportEvent::Closed(Some(e.to_string()))),
                None => return Ok(TransportEvent::Closed(None)),
            }
        }
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!("Closing telemetry socket: {}", e);
        }
    }
}

/// Opens WebSockets at the configured URL template
pub struct WebSocketConnector {
    config: TelemetryConfig,
}

impl WebSocketConnector {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl TelemetryConnector for WebSocketConnector {
    async fn open(&self, session_id: &str) -> Result<Arc<dyn TelemetryTransport>> {
        let url = self.config.socket_url_for(session_id);
        Ok(Arc::new(WebSocketTransport::connect(&url).await?))
    }
}

// ==================== Loopback ====================

/// In-process transport; the other end is a [`LoopbackPeer`]
pub struct LoopbackTransport {
    outgoing: UnboundedSender<String>,
    incoming: tokio::sync::Mutex<UnboundedReceiver<String>>,
    closed: Arc<AtomicBool>,
    shutdown: Notify,
}

/// The service side of a loopback pair
#[derive(Clone)]
pub struct LoopbackPeer {
    inject: Arc<Mutex<Option<UnboundedSender<String>>>>,
    sent: Arc<Mutex<UnboundedReceiver<String>>>,
    closed: Arc<AtomicBool>,
}

impl LoopbackTransport {
    /// Create a connected transport/peer pair
    pub fn pair() -> (Self, LoopbackPeer) {
        let (out_tx, out_rx) = unbounded_channel();
        let (in_tx, in_rx) = unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                outgoing: out_tx,
                incoming: tokio::sync::Mutex::new(in_rx),
                closed: closed.clone(),
                shutdown: Notify::new(),
            },
            LoopbackPeer {
                inject: Arc::new(Mutex::new(Some(in_tx))),
                sent: Arc::new(Mutex::new(out_rx)),
                closed,
            },
        )
    }
}

#[async_trait]
impl TelemetryTransport for LoopbackTransport {
    async fn send(&self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConsoleError::Channel("socket is closed".to_string()));
        }
        self.outgoing
            .send(text)
            .map_err(|_| ConsoleError::Channel("peer is gone".to_string()))
    }

    async fn recv(&self) -> Result<TransportEvent> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(TransportEvent::Closed(None));
        }
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            text = incoming.recv() => match text {
                Some(text) => Ok(TransportEvent::Text(text)),
                None => Ok(TransportEvent::Closed(None)),
            },
            // A console-side close wakes a parked receiver
            _ = self.shutdown.notified() => Ok(TransportEvent::Closed(None)),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Stores a permit if nobody is parked in recv yet
        self.shutdown.notify_one();
    }
}

impl LoopbackPeer {
    /// Deliver a raw text frame to the transport
    pub fn push(&self, text: impl Into<String>) -> bool {
        let inject = self.inject.lock().unwrap_or_else(|e| e.into_inner());
        inject
            .as_ref()
            .map(|tx| tx.send(text.into()).is_ok())
            .unwrap_or(false)
    }

    /// Deliver `{"type": kind, "payload": payload}`
    pub fn push_message(&self, kind: &str, payload: serde_json::Value) -> bool {
        self.push(serde_json::json!({ "type": kind, "payload": payload }).to_string())
    }

    /// Frames the transport has sent so far and not yet taken
    pub fn take_sent(&self) -> Vec<String> {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        let mut frames = Vec::new();
        while let Ok(text) = sent.try_recv() {
            frames.push(text);
        }
        frames
    }

    /// Close from the service side; pending frames are still delivered first
    pub fn close(&self) {
        self.inject
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// Whether the console side closed the socket
    pub fn is_closed_by_console(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Connector handing out loopback transports, keeping every peer
#[derive(Clone, Default)]
pub struct LoopbackConnector {
    peers: Arc<Mutex<Vec<(String, LoopbackPeer)>>>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peer of the most recently opened transport
    pub fn last_peer(&self) -> Option<LoopbackPeer> {
        let peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
        peers.last().map(|(_, peer)| peer.clone())
    }

    /// Session ids of every transport opened so far
    pub fn opened_sessions(&self) -> Vec<String> {
        let peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
        peers.iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl TelemetryConnector for LoopbackConnector {
    async fn open(&self, session_id: &str) -> Result<Arc<dyn TelemetryTransport>> {
        let (transport, peer) = LoopbackTransport::pair();
        self.peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((session_id.to_string(), peer));
        Ok(Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_roundtrip() {
        let (transport, peer) = LoopbackTransport::pair();
        transport.send("hello".to_string()).await.unwrap();
        assert_eq!(peer.take_sent(), vec!["hello".to_string()]);

        assert!(peer.push("world"));
        assert_eq!(
            transport.recv().await.unwrap(),
            TransportEvent::Text("world".to_string())
        );
    }

    #[tokio::test]
    async fn test_loopback_peer_close() {
        let (transport, peer) = LoopbackTransport::pair();
        peer.push("last");
        peer.close();
        assert!(!peer.push("after close"));
        assert_eq!(
            transport.recv().await.unwrap(),
            TransportEvent::Text("last".to_string())
        );
        assert_eq!(transport.recv().await.unwrap(), TransportEvent::Closed(None));
    }

    #[tokio::test]
    async fn test_loopback_console_close_blocks_sends() {
        let (transport, peer) = LoopbackTransport::pair();
        transport.close().await;
        assert!(peer.is_closed_by_console());
        assert!(transport.send("x".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_console_close_wakes_receiver() {
        let (transport, _peer) = LoopbackTransport::pair();
        let transport = Arc::new(transport);
        let parked = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.recv().await })
        };
        tokio::task::yield_now().await;
        transport.close().await;
        assert_eq!(parked.await.unwrap().unwrap(), TransportEvent::Closed(None));
    }

    #[tokio::test]
    async fn test_websocket_invalid_url() {
        assert!(matches!(
            WebSocketTransport::connect("not a url").await,
            Err(ConsoleError::Channel(_))
        ));
    }
}
