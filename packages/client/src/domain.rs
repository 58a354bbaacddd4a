//! Domain types shared by the HTTP calls, the codec and the client facade.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Username/password pair used for a single login call.
///
/// Never stored by the client: it is consumed by the login request.
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Validate and build credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if either field is empty.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();

        if username.is_empty() || password.is_empty() {
            return Err(ClientError::Config(
                "Missing credentials: username and password must not be empty".to_string(),
            ));
        }

        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Opaque bearer token returned by the login endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Authenticated user as returned by the identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Chat room. The client only relies on `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, rename = "participants_ids", alias = "participant_ids")]
    pub participant_ids: Vec<String>,
}

impl Chat {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            participant_ids: Vec::new(),
        }
    }
}

/// Inbound chat message, as emitted by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub body: String,
    pub chat: Chat,
    pub author: User,
    pub created_at: DateTime<Utc>,
}

/// Body of an outbound message. The server assigns the message id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerMessage {
    pub author_id: String,
    pub chat_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Outbound wire envelope: `{ "inner": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEnvelope {
    pub inner: InnerMessage,
}
