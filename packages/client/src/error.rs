//! Error types for the Comlink chat client.

use thiserror::Error;

/// Result alias used throughout the client library.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing or invalid caller input, rejected before any I/O
    #[error("Configuration error: {0}")]
    Config(String),

    /// The login or identity endpoint answered with an unexpected status
    #[error("{endpoint} failed: {status} {reason}")]
    Auth {
        /// Which call failed ("LoginError" or "FetchMeError")
        endpoint: &'static str,
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase of the status code
        reason: String,
    },

    /// Network failure during one of the HTTP calls
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered 2xx but the body is not what the client expects
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The WebSocket handshake did not complete
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    /// Socket-level failure after the connection was opened
    #[error("Connection error: {0}")]
    Transport(String),

    /// An inbound frame could not be decoded into a chat message
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// A connection is already open or being opened
    #[error("Already connected")]
    AlreadyConnected,
}

impl ClientError {
    /// HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Build an [`ClientError::Auth`] from a response status.
    pub(crate) fn auth(endpoint: &'static str, status: reqwest::StatusCode) -> Self {
        Self::Auth {
            endpoint,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
        }
    }
}
