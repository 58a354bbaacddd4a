//! Credential exchange and identity resolution over HTTP.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::{
    config::ServerConfig,
    domain::{Credentials, Token, User},
    error::{ClientError, Result},
};

/// Authentication API used by the client facade before opening the socket.
///
/// Each call is a single round trip; nothing is retried.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a bearer token.
    async fn login(&self, credentials: &Credentials) -> Result<Token>;

    /// Resolve the user the token belongs to.
    async fn who_am_i(&self, token: &Token) -> Result<User>;
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Token,
}

#[derive(Deserialize)]
struct MeResponse {
    user: User,
}

/// [`AuthApi`] implementation backed by `reqwest`.
pub struct HttpAuthApi {
    http: reqwest::Client,
    config: ServerConfig,
}

impl HttpAuthApi {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), config)
    }

    pub fn with_http_client(http: reqwest::Client, config: ServerConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<Token> {
        let url = self.config.login_url()?;
        tracing::debug!("Logging in as '{}' at {}", credentials.username(), url);

        let response = self
            .http
            .get(url)
            .basic_auth(credentials.username(), Some(credentials.password()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Login rejected for '{}': {}", credentials.username(), status);
            return Err(ClientError::auth("LoginError", status));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| ClientError::UnexpectedResponse(format!("login body: {}", e)))?;

        if body.token.is_empty() {
            return Err(ClientError::UnexpectedResponse(
                "login returned an empty token".to_string(),
            ));
        }

        Ok(body.token)
    }

    async fn who_am_i(&self, token: &Token) -> Result<User> {
        let url = self.config.me_url()?;
        tracing::debug!("Resolving identity at {}", url);

        let response = self.http.get(url).bearer_auth(token.as_str()).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!("Identity lookup rejected: {}", status);
            return Err(ClientError::auth("FetchMeError", status));
        }

        let body: MeResponse = response
            .json()
            .await
            .map_err(|e| ClientError::UnexpectedResponse(format!("me body: {}", e)))?;

        if body.user.id.is_empty() || body.user.name.is_empty() {
            return Err(ClientError::UnexpectedResponse(
                "user id and name must not be empty".to_string(),
            ));
        }

        Ok(body.user)
    }
}
