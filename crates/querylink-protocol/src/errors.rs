//! Decode errors for inbound and outbound frames.

use thiserror::Error;

use crate::types::MessageType;

/// A frame that could not be turned into a typed message.
///
/// Receivers log and drop these; a bad frame never tears down the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON envelope.
    #[error("invalid JSON envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// The `type` field names no known message.
    #[error("unknown message type '{0}'")]
    UnknownType(String),

    /// A known message arrived in the wrong direction (e.g. `runQuery` sent to a client).
    #[error("message type '{0}' is not valid in this direction")]
    WrongDirection(MessageType),

    /// The envelope lacks a `requestId` the message type requires.
    #[error("'{0}' requires a requestId")]
    MissingRequestId(MessageType),

    /// The payload does not match the message type's schema.
    #[error("'{message_type}' payload is invalid: {reason}")]
    InvalidPayload {
        /// Type of the offending message.
        message_type: MessageType,
        /// What the payload decoder rejected.
        reason: String,
    },
}
