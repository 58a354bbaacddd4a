//! Client facade: login, identity lookup, socket and message logs in one object.

use std::sync::{Arc, Mutex, PoisonError};

use comlink_shared::time::{Clock, SystemClock};

use crate::{
    auth::{AuthApi, HttpAuthApi},
    codec,
    config::ServerConfig,
    connection::{ConnectionManager, ConnectionState, FrameHandler, FrameSender},
    domain::{Credentials, Message, OutgoingEnvelope, Token, User},
    error::{ClientError, Result},
    handler::EventHandler,
};

type ReceivedLog = Arc<Mutex<Vec<Message>>>;

/// Chat client bound to one server.
///
/// # Example
///
/// ```ignore
/// let (handler, mut events) = ChannelHandler::new();
/// let mut client = ChatClient::new(ServerConfig::new("127.0.0.1", 3000), Arc::new(handler));
///
/// let user = client.connect("alice", "secret").await?;
/// client.send_utf8(CHAT_ID, "hello")?;
/// client.disconnect();
/// ```
pub struct ChatClient {
    config: ServerConfig,
    auth: Arc<dyn AuthApi>,
    handler: Arc<dyn EventHandler>,
    clock: Arc<dyn Clock>,
    connection: Option<ConnectionManager>,
    token: Option<Token>,
    user: Option<User>,
    sent: Vec<OutgoingEnvelope>,
    received: ReceivedLog,
}

impl ChatClient {
    /// Create a client talking to the HTTP API described by `config`.
    pub fn new(config: ServerConfig, handler: Arc<dyn EventHandler>) -> Self {
        let auth = Arc::new(HttpAuthApi::new(config.clone()));
        Self::with_auth_api(config, auth, handler)
    }

    /// Create a client with a custom authentication backend.
    pub fn with_auth_api(
        config: ServerConfig,
        auth: Arc<dyn AuthApi>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            config,
            auth,
            handler,
            clock: Arc::new(SystemClock),
            connection: None,
            token: None,
            user: None,
            sent: Vec::new(),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replace the clock used to stamp outgoing messages.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Log in, resolve the current user and open the chat socket, in that order.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Config`] for empty credentials, before any request
    /// - [`ClientError::AlreadyConnected`] while a connection is live
    /// - [`ClientError::Auth`] when login or identity lookup is rejected;
    ///   the socket is not opened
    /// - [`ClientError::Handshake`] when the socket cannot be opened
    pub async fn connect(&mut self, username: &str, password: &str) -> Result<User> {
        let credentials = Credentials::new(username, password)?;
        self.ensure_not_connected()?;

        let token = self.auth.login(&credentials).await?;
        drop(credentials);

        self.open_with_token(token).await
    }

    /// Resolve the current user from an externally obtained token and open the socket.
    pub async fn connect_with_token(&mut self, token: Token) -> Result<User> {
        if token.is_empty() {
            return Err(ClientError::Config("token must not be empty".to_string()));
        }
        self.ensure_not_connected()?;

        self.open_with_token(token).await
    }

    async fn open_with_token(&mut self, token: Token) -> Result<User> {
        let user = self.auth.who_am_i(&token).await?;
        let url = self.config.chat_socket_url(&token)?;

        let dispatcher = Dispatcher {
            user: user.clone(),
            handler: self.handler.clone(),
            received: self.received.clone(),
        };
        let mut connection = ConnectionManager::new(Arc::new(dispatcher));
        connection.open(&url).await?;

        tracing::info!("Connected as {} id: {}", user.name, user.id);

        self.connection = Some(connection);
        self.token = Some(token);
        self.user = Some(user.clone());

        Ok(user)
    }

    fn ensure_not_connected(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Open => {
                Err(ClientError::AlreadyConnected)
            }
            ConnectionState::Idle | ConnectionState::Closed => Ok(()),
        }
    }

    /// Close the connection with code 1000. Does nothing when not connected.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.as_mut() {
            connection.close();
        }
        self.token = None;
        self.user = None;
    }

    /// Send `text` to `chat_id` as the connected user.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] before `connect`, after `disconnect`
    /// or once the server closed the socket. Nothing is sent or logged then.
    pub fn send_utf8(&mut self, chat_id: &str, text: &str) -> Result<()> {
        let (Some(connection), Some(user)) = (&self.connection, &self.user) else {
            return Err(ClientError::NotConnected);
        };
        if connection.state() != ConnectionState::Open {
            return Err(ClientError::NotConnected);
        }

        let envelope = codec::encode(user, chat_id, text, self.clock.now());
        connection.send_text(codec::to_frame(&envelope)?)?;
        tracing::debug!("Sent message to chat {}", chat_id);

        self.sent.push(envelope);
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Idle, ConnectionManager::state)
    }

    /// The user resolved by the last successful `connect`, until `disconnect`.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn sent_messages(&self) -> &[OutgoingEnvelope] {
        &self.sent
    }

    pub fn received_messages(&self) -> Vec<Message> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget every sent and received message.
    pub fn clear_history(&mut self) {
        self.sent.clear();
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Bridges raw socket events to the caller's [`EventHandler`].
struct Dispatcher {
    user: User,
    handler: Arc<dyn EventHandler>,
    received: ReceivedLog,
}

impl Dispatcher {
    fn handle_incoming_message(&self, text: &str) {
        match codec::decode(text) {
            Ok(message) => {
                self.received
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(message.clone());
                self.handler.on_message(message);
            }
            Err(e) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
                self.handler.on_error(e);
            }
        }
    }
}

impl FrameHandler for Dispatcher {
    fn on_open(&self, sender: &FrameSender) {
        tracing::info!("Authenticated with Comlink WebSocket!");
        self.handler.on_connect(&self.user, sender);
    }

    fn on_text(&self, text: &str) {
        self.handle_incoming_message(text);
    }

    fn on_error(&self, error: ClientError) {
        self.handler.on_error(error);
    }

    fn on_close(&self, code: u16) {
        self.handler.on_disconnect(code);
    }
}
