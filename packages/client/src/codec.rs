//! JSON codec for chat frames.
//!
//! Outbound frames use the `{ "inner": { ... } }` envelope, inbound frames are
//! flat [`Message`] objects. Decoding validates the frame against the expected
//! shape instead of trusting the wire payload.

use chrono::{DateTime, Utc};

use crate::{
    domain::{InnerMessage, Message, OutgoingEnvelope, User},
    error::{ClientError, Result},
};

/// Build an outbound envelope stamped with the author's id.
///
/// Taking the resolved [`User`] guarantees an envelope always has an author.
pub fn encode(
    author: &User,
    chat_id: &str,
    body: &str,
    created_at: DateTime<Utc>,
) -> OutgoingEnvelope {
    OutgoingEnvelope {
        inner: InnerMessage {
            author_id: author.id.clone(),
            chat_id: chat_id.to_string(),
            body: body.to_string(),
            created_at,
        },
    }
}

/// Serialize an outbound envelope into a text frame.
pub fn to_frame(envelope: &OutgoingEnvelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|e| ClientError::MalformedMessage(e.to_string()))
}

/// Decode an inbound text frame into a [`Message`].
///
/// # Errors
///
/// Returns [`ClientError::MalformedMessage`] if the frame is not JSON, does not
/// match the message shape, or carries an empty message id.
pub fn decode(raw: &str) -> Result<Message> {
    let message: Message =
        serde_json::from_str(raw).map_err(|e| ClientError::MalformedMessage(e.to_string()))?;

    if message.id.is_empty() {
        return Err(ClientError::MalformedMessage(
            "message id must not be empty".to_string(),
        ));
    }

    Ok(message)
}

/// Decode an outbound envelope frame (the inverse of [`to_frame`]).
pub fn decode_envelope(raw: &str) -> Result<OutgoingEnvelope> {
    serde_json::from_str(raw).map_err(|e| ClientError::MalformedMessage(e.to_string()))
}
