//! Comlink command-line chat client.
//!
//! Logs in with the given credentials, resolves the current user, opens the chat
//! WebSocket and sends every line typed at the `>` prompt to the chat room.
//! Press Ctrl+C or Ctrl+D to disconnect. The client never reconnects on its own.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin comlink-client -- alice secret
//! cargo run --bin comlink-client -- alice secret --host 127.0.0.1 --port 3000
//! ```

use clap::Parser;
use uuid::Uuid;

use comlink_client::{
    ServerConfig,
    cli::{SessionOptions, run_session},
    config::{DEFAULT_HOST, DEFAULT_PORT},
};
use comlink_shared::logger::setup_logger;

const DEFAULT_CHAT_ID: &str = "85cca390-8a85-42f7-b122-262d0c924675";

#[derive(Parser, Debug)]
#[command(name = "comlink-client")]
#[command(about = "Minimal real-time chat client over WebSocket", long_about = None)]
struct Args {
    /// Username to log in with
    username: String,

    /// Password to log in with
    password: String,

    /// Chat API host
    #[arg(long, env = "COMLINK_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Chat API port
    #[arg(short = 'p', long, env = "COMLINK_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Use https / wss instead of http / ws
    #[arg(long)]
    secure: bool,

    /// Chat room to send messages to
    #[arg(short = 'c', long, env = "COMLINK_CHAT_ID", default_value = DEFAULT_CHAT_ID)]
    chat_id: Uuid,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let options = SessionOptions {
        server: ServerConfig::new(args.host, args.port).with_secure(args.secure),
        username: args.username,
        password: args.password,
        chat_id: args.chat_id.to_string(),
    };

    if let Err(e) = run_session(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
