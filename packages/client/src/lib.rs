//! Comlink chat client library.
//!
//! Logs in over HTTP, resolves the current user and keeps a single WebSocket
//! connection to a chat room. [`ChatClient`] is the entry point; events are
//! delivered through an [`EventHandler`].

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod handler;

// command-line shell
pub mod cli;

pub use client::ChatClient;
pub use config::ServerConfig;
pub use connection::{ConnectionState, FrameSender};
pub use domain::{Chat, Message, OutgoingEnvelope, Token, User};
pub use error::{ClientError, Result};
pub use handler::{ChannelHandler, ClientEvent, EventHandler};
