//! WebSocket connection lifecycle.
//!
//! [`ConnectionManager`] owns the single socket of a client. Opening the socket
//! splits it into two tasks:
//!
//! - a reader task delivering text frames and lifecycle events to a
//!   [`FrameHandler`], one at a time
//! - a writer task draining an unbounded queue fed by [`FrameSender`]
//!
//! ```text
//! Idle ──open()──▶ Connecting ──handshake ok──▶ Open ──close() / close frame──▶ Closed
//!                      │                                                          ▲
//!                      └──────────────────handshake failed────────────────────────┘
//! ```
//!
//! Nothing is retried: once `Closed`, the caller decides whether to open again.

use std::sync::Arc;

use futures_util::{SinkExt, Stream, StreamExt, stream::SplitSink};
use reqwest::Url;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Error as WsError,
        protocol::{CloseFrame, Message as WsMessage, frame::coding::CloseCode},
    },
};

use crate::error::{ClientError, Result};

/// Close code sent on caller-initiated shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Reported when a close frame carries no status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Reported when the stream ends without any close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle state of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Receiver of raw socket events.
pub trait FrameHandler: Send + Sync {
    /// The handshake completed. Called once, before any `on_text`.
    fn on_open(&self, sender: &FrameSender);

    /// A text frame arrived.
    fn on_text(&self, text: &str);

    /// Handshake or transport failure. Does not close the socket by itself.
    fn on_error(&self, error: ClientError);

    /// The socket closed with the given code.
    fn on_close(&self, code: u16);
}

/// Cloneable handle for queueing frames on an open connection.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<WsMessage>,
    state: watch::Receiver<ConnectionState>,
}

impl FrameSender {
    /// Queue a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] unless the connection is open.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        if *self.state.borrow() != ConnectionState::Open {
            return Err(ClientError::NotConnected);
        }

        self.tx
            .send(WsMessage::Text(text.into().into()))
            .map_err(|_| ClientError::NotConnected)
    }

    fn send_close(&self) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        self.tx
            .send(WsMessage::Close(Some(frame)))
            .map_err(|_| ClientError::NotConnected)
    }
}

#[cfg(test)]
impl FrameSender {
    /// Sender reporting `Open` that queues into the returned receiver.
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<WsMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_, state) = watch::channel(ConnectionState::Open);
        (Self { tx, state }, rx)
    }
}

/// Owner of the client's single WebSocket connection.
pub struct ConnectionManager {
    handler: Arc<dyn FrameHandler>,
    state: Arc<watch::Sender<ConnectionState>>,
    sender: Option<FrameSender>,
}

impl ConnectionManager {
    pub fn new(handler: Arc<dyn FrameHandler>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            handler,
            state: Arc::new(state),
            sender: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Open the socket at `url` and start the reader and writer tasks.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadyConnected`] while a connection is connecting or open
    /// - [`ClientError::Handshake`] if the handshake fails; the handler's
    ///   `on_error` receives the same failure
    pub async fn open(&mut self, url: &Url) -> Result<()> {
        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return Err(ClientError::AlreadyConnected);
        }

        self.state.send_replace(ConnectionState::Connecting);
        tracing::info!(
            "Connecting to {}://{}{}",
            url.scheme(),
            url.host_str().unwrap_or_default(),
            url.path()
        );

        let (ws_stream, response) = match connect_async(url.as_str()).await {
            Ok(result) => result,
            Err(e) => {
                let message = e.to_string();
                tracing::error!("Connect Error: {}", message);
                self.state.send_replace(ConnectionState::Closed);
                self.handler.on_error(ClientError::Handshake(message.clone()));
                return Err(ClientError::Handshake(message));
            }
        };
        tracing::debug!("Handshake completed with status {}", response.status());

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        self.state.send_replace(ConnectionState::Open);
        let sender = FrameSender {
            tx,
            state: self.state.subscribe(),
        };

        // Runs before the reader task exists, so it precedes every on_text.
        self.handler.on_open(&sender);

        tokio::spawn(run_writer(
            write,
            rx,
            self.state.subscribe(),
            self.handler.clone(),
        ));
        tokio::spawn(run_reader(read, self.state.clone(), self.handler.clone()));

        self.sender = Some(sender);
        tracing::info!("WebSocket connection established");

        Ok(())
    }

    /// Queue a text frame on the live connection.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        match &self.sender {
            Some(sender) => sender.send_text(text),
            None => Err(ClientError::NotConnected),
        }
    }

    /// Close the connection with code 1000.
    ///
    /// Safe to call at any time: without a live connection it does nothing, and
    /// a second call never sends another close frame.
    pub fn close(&mut self) {
        let Some(sender) = self.sender.take() else {
            tracing::debug!("close() ignored: no live connection");
            return;
        };

        if self.state() == ConnectionState::Open {
            if let Err(e) = sender.send_close() {
                tracing::debug!("Close frame not queued: {}", e);
            }
            tracing::info!("Closing connection with code {}", NORMAL_CLOSURE);
        }

        self.state.send_replace(ConnectionState::Closed);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_writer(
    mut write: SplitSink<WsStream, WsMessage>,
    mut rx: mpsc::UnboundedReceiver<WsMessage>,
    mut state: watch::Receiver<ConnectionState>,
    handler: Arc<dyn FrameHandler>,
) {
    loop {
        tokio::select! {
            // Frames queued before close() must still go out.
            biased;
            message = rx.recv() => {
                let Some(message) = message else {
                    break;
                };
                let closing = matches!(message, WsMessage::Close(_));

                if let Err(e) = write.send(message).await {
                    tracing::warn!("Failed to send frame: {}", e);
                    handler.on_error(ClientError::Transport(e.to_string()));
                    break;
                }

                if closing {
                    break;
                }
            }
            _ = wait_closed(&mut state) => break,
        }
    }

    tracing::debug!("Writer task finished");
}

async fn wait_closed(state: &mut watch::Receiver<ConnectionState>) {
    // Err means the manager and reader are gone, which is a close too
    let _ = state
        .wait_for(|state| *state == ConnectionState::Closed)
        .await;
}

async fn run_reader<S>(
    mut read: S,
    state: Arc<watch::Sender<ConnectionState>>,
    handler: Arc<dyn FrameHandler>,
) where
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    let mut close_code = None;

    while let Some(frame) = read.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                if *state.borrow() != ConnectionState::Open {
                    tracing::debug!("Dropping frame received after close");
                    continue;
                }
                tracing::debug!("Received text frame ({} bytes)", text.len());
                handler.on_text(text.as_str());
            }
            Ok(WsMessage::Close(frame)) => {
                close_code = Some(
                    frame
                        .map(|frame| u16::from(frame.code))
                        .unwrap_or(NO_STATUS_RECEIVED),
                );
                break;
            }
            Ok(_) => {
                // Binary, ping and pong frames are not surfaced
            }
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
            Err(e) => {
                // Fatal errors end the stream on the next poll
                tracing::warn!("Connection Error: {}", e);
                handler.on_error(ClientError::Transport(e.to_string()));
            }
        }
    }

    let code = close_code.unwrap_or(ABNORMAL_CLOSURE);
    state.send_replace(ConnectionState::Closed);
    tracing::info!("Connection closed with code: {}", code);
    handler.on_close(code);
}
