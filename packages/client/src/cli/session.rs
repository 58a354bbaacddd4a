//! Interactive chat session: readline input on one side, socket events on the other.

use std::{sync::Arc, time::Duration};

use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

use crate::{
    client::ChatClient,
    config::ServerConfig,
    error::Result,
    handler::{ChannelHandler, ClientEvent},
};

use super::{
    formatter::MessageFormatter,
    ui::{PROMPT, redisplay_prompt},
};

/// How long to wait for the server to acknowledge a clean close before exiting.
const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Everything a session needs to start.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub server: ServerConfig,
    pub username: String,
    pub password: String,
    pub chat_id: String,
}

/// Connect and run the interactive session until the user quits or the
/// server closes the connection.
///
/// # Errors
///
/// Returns the error of the connect sequence (login, identity or handshake).
pub async fn run_session(options: SessionOptions) -> Result<()> {
    let SessionOptions {
        server,
        username,
        password,
        chat_id,
    } = options;

    let (handler, mut events) = ChannelHandler::new();
    let mut client = ChatClient::new(server, Arc::new(handler));

    let user = client.connect(&username, &password).await?;
    drop(password);

    print!("{}", MessageFormatter::format_connected(&user, &chat_id));
    println!("Type messages and press Enter to send. Press Ctrl+C to exit.\n");

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();

    // rustyline is blocking, so it gets its own thread
    std::thread::spawn(move || read_lines(input_tx));

    loop {
        tokio::select! {
            line = input_rx.recv() => {
                let Some(line) = line else {
                    tracing::info!("Input closed, disconnecting");
                    client.disconnect();
                    wait_for_close(&mut events).await;
                    break;
                };

                match client.send_utf8(&chat_id, &line) {
                    Ok(()) => {
                        if let Some(envelope) = client.sent_messages().last() {
                            print!(
                                "\n{}",
                                MessageFormatter::format_sent_confirmation(&envelope.inner.created_at)
                            );
                        }
                    }
                    Err(e) => tracing::warn!("Failed to send message: {}", e),
                }
                redisplay_prompt();
            }
            event = events.recv() => {
                match event {
                    Some(ClientEvent::Connected(..)) => {}
                    Some(ClientEvent::Message(message)) => {
                        print!("{}", MessageFormatter::format_chat_message(&message, &user.id));
                        redisplay_prompt();
                    }
                    Some(ClientEvent::Error(e)) => {
                        print!("{}", MessageFormatter::format_error(&e));
                        redisplay_prompt();
                    }
                    Some(ClientEvent::Disconnected(code)) => {
                        print!("{}", MessageFormatter::format_disconnected(code));
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!("Chat session ended");
    Ok(())
}

fn read_lines(input_tx: mpsc::UnboundedSender<String>) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            tracing::error!("Failed to initialize readline: {}", e);
            return;
        }
    };

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();
                if input_tx.send(line.to_string()).is_err() {
                    // Session over
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C
                tracing::info!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D
                tracing::info!("EOF");
                break;
            }
            Err(err) => {
                tracing::error!("Readline error: {}", err);
                break;
            }
        }
    }
}

/// Drain events until the close is acknowledged or the grace period runs out.
async fn wait_for_close(events: &mut mpsc::UnboundedReceiver<ClientEvent>) {
    let drained = tokio::time::timeout(CLOSE_GRACE_PERIOD, async {
        while let Some(event) = events.recv().await {
            if let ClientEvent::Disconnected(code) = event {
                print!("{}", MessageFormatter::format_disconnected(code));
                return;
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!("Server did not acknowledge close within {:?}", CLOSE_GRACE_PERIOD);
    }
}
