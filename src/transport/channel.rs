//! WebSocket transport channel
//!
//! Sends PCM frames as binary messages and forwards every inbound message,
//! untouched, to the owner as a [`TransportEvent`]. There is no queueing and
//! no reconnection: sending while not open drops the frame.

use std::fmt;
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::voice::AudioFrame;
use crate::{Error, Result};

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

/// Lifecycle of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Closed by either side, or failed
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A raw inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Something that happened on the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open
    Opened,
    /// An inbound message
    Frame(InboundFrame),
    /// The remote side closed the connection
    Closed { reason: Option<String> },
    /// The connection failed
    Error(String),
}

/// Persistent connection to one voice service endpoint
pub struct TransportChannel {
    url: Url,
    state: Arc<watch::Sender<ConnectionState>>,
    sink: Option<WsSink>,
    reader: Option<JoinHandle<()>>,
}

impl TransportChannel {
    /// Create a disconnected channel for `url`
    #[must_use]
    pub fn new(url: Url) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url,
            state: Arc::new(state),
            sink: None,
            reader: None,
        }
    }

    /// Endpoint this channel connects to
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Check if frames can currently be sent
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open && self.sink.is_some()
    }

    /// Open the connection
    ///
    /// On success the returned receiver yields [`TransportEvent::Opened`]
    /// first, then every inbound message in arrival order.
    ///
    /// # Errors
    ///
    /// Returns error if already open or the connection cannot be established
    pub async fn connect(&mut self) -> Result<mpsc::UnboundedReceiver<TransportEvent>> {
        if self.is_open() {
            return Err(Error::Connection("already connected".to_string()));
        }

        self.state.send_replace(ConnectionState::Connecting);
        tracing::info!(url = %self.url, "connecting");

        let ws = match tokio_tungstenite::connect_async(self.url.as_str()).await {
            Ok((ws, _response)) => ws,
            Err(e) => {
                self.state.send_replace(ConnectionState::Closed);
                tracing::error!(url = %self.url, error = %e, "connection failed");
                return Err(Error::Connection(e.to_string()));
            }
        };

        let (sink, stream) = ws.split();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        self.sink = Some(sink);
        self.state.send_replace(ConnectionState::Open);
        let _ = events_tx.send(TransportEvent::Opened);

        self.reader = Some(tokio::spawn(read_pump(
            stream,
            events_tx,
            Arc::clone(&self.state),
        )));

        tracing::info!(url = %self.url, "connection open");
        Ok(events_rx)
    }

    /// Send one PCM frame as a binary message
    ///
    /// Returns false when the frame was not sent. A closed channel drops the
    /// frame with a warning; it is never queued or retried.
    pub async fn send(&mut self, frame: &AudioFrame) -> bool {
        self.send_bytes(frame.to_le_bytes()).await
    }

    /// Send raw bytes as a binary message
    pub async fn send_bytes(&mut self, bytes: Vec<u8>) -> bool {
        if self.state() != ConnectionState::Open {
            tracing::warn!(
                state = %self.state(),
                bytes = bytes.len(),
                "channel not open, frame dropped"
            );
            return false;
        }
        let Some(sink) = self.sink.as_mut() else {
            tracing::warn!(bytes = bytes.len(), "channel not open, frame dropped");
            return false;
        };

        let len = bytes.len();
        match sink.send(Message::binary(bytes)).await {
            Ok(()) => {
                tracing::trace!(bytes = len, "frame sent");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "send failed, closing channel");
                self.sink = None;
                self.state.send_replace(ConnectionState::Closed);
                false
            }
        }
    }

    /// Close the connection; idempotent
    pub async fn disconnect(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        let Some(mut sink) = self.sink.take() else {
            if self.state() != ConnectionState::Disconnected {
                self.state.send_replace(ConnectionState::Closed);
            }
            return;
        };

        if let Err(e) = sink.send(Message::Close(None)).await {
            tracing::debug!(error = %e, "close frame not sent");
        }
        if let Err(e) = sink.close().await {
            tracing::debug!(error = %e, "socket close failed");
        }

        self.state.send_replace(ConnectionState::Closed);
        tracing::info!(url = %self.url, "connection closed");
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_pump(
    mut stream: WsStream,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                tracing::trace!(bytes = text.len(), "<-- text message");
                let _ = events.send(TransportEvent::Frame(InboundFrame::Text(
                    text.as_str().to_owned(),
                )));
            }
            Some(Ok(Message::Binary(data))) => {
                tracing::trace!(bytes = data.len(), "<-- binary message");
                let _ = events.send(TransportEvent::Frame(InboundFrame::Binary(data.to_vec())));
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty());
                tracing::info!(?reason, "connection closed by remote");
                state.send_replace(ConnectionState::Closed);
                let _ = events.send(TransportEvent::Closed { reason });
                break;
            }
            // Pings are answered by tungstenite
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "connection error");
                state.send_replace(ConnectionState::Closed);
                let _ = events.send(TransportEvent::Error(e.to_string()));
                break;
            }
            None => {
                tracing::info!("connection ended");
                state.send_replace(ConnectionState::Closed);
                let _ = events.send(TransportEvent::Closed { reason: None });
                break;
            }
        }
    }
}
