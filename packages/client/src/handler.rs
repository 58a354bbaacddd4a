//! Caller-facing event callbacks.

use tokio::sync::mpsc;

use crate::{
    connection::FrameSender,
    domain::{Message, User},
    error::ClientError,
};

/// Callbacks invoked by the client on connection lifecycle events.
///
/// Callbacks are delivered one at a time from the connection's reader task.
/// `on_connect` always precedes the first `on_message`; the other callbacks may
/// interleave freely. Every method has a no-op default.
pub trait EventHandler: Send + Sync {
    /// The socket is open. Fired once per connection.
    ///
    /// `sender` queues raw text frames on this connection and stops working
    /// once it closes.
    fn on_connect(&self, _user: &User, _sender: &FrameSender) {}

    /// A chat message was received and decoded.
    fn on_message(&self, _message: Message) {}

    /// A transport error, a failed handshake or an undecodable frame.
    ///
    /// Errors do not close the connection by themselves.
    fn on_error(&self, _error: ClientError) {}

    /// The connection closed with the given WebSocket close code.
    fn on_disconnect(&self, _code: u16) {}
}

/// Events emitted by [`ChannelHandler`].
#[derive(Debug)]
pub enum ClientEvent {
    Connected(User, FrameSender),
    Message(Message),
    Error(ClientError),
    Disconnected(u16),
}

/// [`EventHandler`] that forwards every callback as a [`ClientEvent`] on an
/// unbounded channel, for consumption by a caller-owned task.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ClientEvent) {
        // Receiver dropped: nobody is listening any more
        if self.tx.send(event).is_err() {
            tracing::debug!("Event receiver dropped, discarding event");
        }
    }
}

impl EventHandler for ChannelHandler {
    fn on_connect(&self, user: &User, sender: &FrameSender) {
        self.forward(ClientEvent::Connected(user.clone(), sender.clone()));
    }

    fn on_message(&self, message: Message) {
        self.forward(ClientEvent::Message(message));
    }

    fn on_error(&self, error: ClientError) {
        self.forward(ClientEvent::Error(error));
    }

    fn on_disconnect(&self, code: u16) {
        self.forward(ClientEvent::Disconnected(code));
    }
}
