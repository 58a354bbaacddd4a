//! Server endpoint configuration.

use reqwest::Url;

use crate::{
    domain::Token,
    error::{ClientError, Result},
};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

const LOGIN_PATH: &str = "/api/v1/auth/login";
const ME_PATH: &str = "/api/v1/auth/me";
const CHATS_PATH: &str = "/api/v1/chats";

/// Location of the chat API.
///
/// `secure` switches both the HTTP calls (`https`) and the socket (`wss`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            secure: false,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            secure: false,
        }
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// `GET` endpoint exchanging credentials for a token.
    pub fn login_url(&self) -> Result<Url> {
        self.url(self.http_scheme(), LOGIN_PATH)
    }

    /// `GET` endpoint resolving the bearer token into a user.
    pub fn me_url(&self) -> Result<Url> {
        self.url(self.http_scheme(), ME_PATH)
    }

    /// WebSocket endpoint of the chat, authenticated by the `token` query parameter.
    pub fn chat_socket_url(&self, token: &Token) -> Result<Url> {
        let mut url = self.url(self.ws_scheme(), CHATS_PATH)?;
        url.query_pairs_mut().append_pair("token", token.as_str());
        Ok(url)
    }

    fn http_scheme(&self) -> &'static str {
        if self.secure { "https" } else { "http" }
    }

    fn ws_scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    fn url(&self, scheme: &str, path: &str) -> Result<Url> {
        if self.host.is_empty() {
            return Err(ClientError::Config("server host must not be empty".to_string()));
        }

        let raw = format!("{}://{}:{}{}", scheme, self.host, self.port, path);
        Url::parse(&raw).map_err(|e| ClientError::Config(format!("invalid server url '{}': {}", raw, e)))
    }
}
