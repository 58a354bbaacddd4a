//! Message formatting utilities for shell display.

use chrono::{DateTime, Utc};
use comlink_shared::time::to_rfc3339_millis;

use crate::{
    domain::{Message, User},
    error::ClientError,
};

const RULE: &str = "------------------------------------------------------------";
const DOUBLE_RULE: &str = "============================================================";

/// Message formatter for shell display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the banner shown once the connection is open
    ///
    /// # Arguments
    ///
    /// * `user` - The authenticated user
    /// * `chat_id` - The chat room messages are sent to
    pub fn format_connected(user: &User, chat_id: &str) -> String {
        format!(
            "\n{}\nConnected with success as {}\nUser ID: {}\nChat ID: {}\n{}\n",
            DOUBLE_RULE, user.name, user.id, chat_id, DOUBLE_RULE
        )
    }

    /// Format a received chat message
    ///
    /// # Arguments
    ///
    /// * `message` - The decoded message
    /// * `current_user_id` - The connected user's id (to mark own messages as "me")
    pub fn format_chat_message(message: &Message, current_user_id: &str) -> String {
        let me_suffix = if message.author.id == current_user_id {
            " (me)"
        } else {
            ""
        };
        format!(
            "\n\n{}\n@{}{}: {}\nsent at {}\n{}\n",
            RULE,
            message.author.name,
            me_suffix,
            message.body,
            to_rfc3339_millis(&message.created_at),
            RULE
        )
    }

    /// Format a confirmation message after sending
    pub fn format_sent_confirmation(created_at: &DateTime<Utc>) -> String {
        format!("sent at {}\n", to_rfc3339_millis(created_at))
    }

    /// Format an error reported by the connection
    pub fn format_error(error: &ClientError) -> String {
        format!("\n! {}\n", error)
    }

    /// Format the end-of-session notice
    pub fn format_disconnected(code: u16) -> String {
        format!("\nChat finalized (code {})\n", code)
    }
}
