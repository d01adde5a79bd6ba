//! Typed client and server messages, with envelope encode/decode.
//!
//! Both directions can be encoded and decoded so the same types serve the
//! client, in-process fakes, and test servers.

use serde::de::DeserializeOwned;
use serde_json::json;

use crate::errors::ProtocolError;
use crate::ids::{QueryId, RequestId};
use crate::types::{
    AcceptedPayload, CancelQueryPayload, CanceledPayload, DonePayload, Envelope, ErrorPayload,
    MessageType, ProgressPayload, RowsPayload, RunQueryPayload,
};

// ─────────────────────────────────────────────────────────────────────────────
// Client → server
// ─────────────────────────────────────────────────────────────────────────────

/// A message the client sends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Start a query; answered by `queryAccepted` with the same request ID.
    RunQuery {
        /// Correlation ID.
        request_id: RequestId,
        /// SQL text.
        sql: String,
    },
    /// Ask the server to stop a query. No direct reply; a `queryCanceled`
    /// event follows if the server honors it.
    CancelQuery {
        /// Query to stop.
        query_id: QueryId,
    },
    /// Keep-alive.
    Ping,
}

impl ClientMessage {
    /// Wire type of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::RunQuery { .. } => MessageType::RunQuery,
            Self::CancelQuery { .. } => MessageType::CancelQuery,
            Self::Ping => MessageType::Ping,
        }
    }

    /// Build the wire envelope.
    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let envelope = match self {
            Self::RunQuery { request_id, sql } => Envelope::new(
                MessageType::RunQuery,
                Some(request_id.to_string()),
                serde_json::to_value(RunQueryPayload { sql: sql.clone() })?,
            ),
            Self::CancelQuery { query_id } => Envelope::new(
                MessageType::CancelQuery,
                None,
                serde_json::to_value(CancelQueryPayload {
                    query_id: query_id.clone(),
                })?,
            ),
            Self::Ping => Envelope::new(MessageType::Ping, None, json!({})),
        };
        Ok(envelope)
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&self.to_envelope()?)?)
    }

    /// Parse a JSON text frame sent by a client.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Self::from_envelope(&envelope)
    }

    /// Convert an untyped envelope into a client message.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let message_type = known_type(envelope)?;
        match message_type {
            MessageType::RunQuery => {
                let request_id = required_request_id(envelope, message_type)?;
                let payload: RunQueryPayload = payload(envelope, message_type)?;
                Ok(Self::RunQuery {
                    request_id,
                    sql: payload.sql,
                })
            }
            MessageType::CancelQuery => {
                let payload: CancelQueryPayload = payload(envelope, message_type)?;
                Ok(Self::CancelQuery {
                    query_id: payload.query_id,
                })
            }
            MessageType::Ping => Ok(Self::Ping),
            other => Err(ProtocolError::WrongDirection(other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server → client
// ─────────────────────────────────────────────────────────────────────────────

/// A message the server sends.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    /// A `runQuery` was accepted.
    QueryAccepted {
        /// Echo of the `runQuery` request ID.
        request_id: RequestId,
        /// ID assigned to the query.
        query_id: QueryId,
    },
    /// Liveness report for a running query.
    QueryProgress(ProgressPayload),
    /// Batch of rows.
    QueryRows(RowsPayload),
    /// Query finished.
    QueryDone(DonePayload),
    /// Query failed.
    QueryError(ErrorPayload),
    /// Query canceled.
    QueryCanceled(CanceledPayload),
    /// Keep-alive reply (the server may echo a request ID).
    Pong {
        /// Echoed request ID, if any.
        request_id: Option<RequestId>,
    },
}

impl ServerMessage {
    /// Wire type of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::QueryAccepted { .. } => MessageType::QueryAccepted,
            Self::QueryProgress(_) => MessageType::QueryProgress,
            Self::QueryRows(_) => MessageType::QueryRows,
            Self::QueryDone(_) => MessageType::QueryDone,
            Self::QueryError(_) => MessageType::QueryError,
            Self::QueryCanceled(_) => MessageType::QueryCanceled,
            Self::Pong { .. } => MessageType::Pong,
        }
    }

    /// Query this message is about, if it is query-bound.
    ///
    /// `queryAccepted` returns `None`: it is routed by request ID, not query ID.
    pub fn query_id(&self) -> Option<&QueryId> {
        match self {
            Self::QueryProgress(p) => Some(&p.query_id),
            Self::QueryRows(p) => Some(&p.query_id),
            Self::QueryDone(p) => Some(&p.query_id),
            Self::QueryError(p) => Some(&p.query_id),
            Self::QueryCanceled(p) => Some(&p.query_id),
            Self::QueryAccepted { .. } | Self::Pong { .. } => None,
        }
    }

    /// Build the wire envelope.
    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let message_type = self.message_type();
        let envelope = match self {
            Self::QueryAccepted {
                request_id,
                query_id,
            } => Envelope::new(
                message_type,
                Some(request_id.to_string()),
                serde_json::to_value(AcceptedPayload {
                    query_id: query_id.clone(),
                })?,
            ),
            Self::QueryProgress(p) => Envelope::new(message_type, None, serde_json::to_value(p)?),
            Self::QueryRows(p) => Envelope::new(message_type, None, serde_json::to_value(p)?),
            Self::QueryDone(p) => Envelope::new(message_type, None, serde_json::to_value(p)?),
            Self::QueryError(p) => Envelope::new(message_type, None, serde_json::to_value(p)?),
            Self::QueryCanceled(p) => Envelope::new(message_type, None, serde_json::to_value(p)?),
            Self::Pong { request_id } => Envelope::new(
                message_type,
                request_id.as_ref().map(ToString::to_string),
                json!({}),
            ),
        };
        Ok(envelope)
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&self.to_envelope()?)?)
    }

    /// Parse a JSON text frame sent by the server.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Self::from_envelope(&envelope)
    }

    /// Convert an untyped envelope into a server message.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let message_type = known_type(envelope)?;
        match message_type {
            MessageType::QueryAccepted => {
                let request_id = required_request_id(envelope, message_type)?;
                let payload: AcceptedPayload = payload(envelope, message_type)?;
                Ok(Self::QueryAccepted {
                    request_id,
                    query_id: payload.query_id,
                })
            }
            MessageType::QueryProgress => {
                Ok(Self::QueryProgress(payload(envelope, message_type)?))
            }
            MessageType::QueryRows => Ok(Self::QueryRows(payload(envelope, message_type)?)),
            MessageType::QueryDone => Ok(Self::QueryDone(payload(envelope, message_type)?)),
            MessageType::QueryError => Ok(Self::QueryError(payload(envelope, message_type)?)),
            MessageType::QueryCanceled => {
                Ok(Self::QueryCanceled(payload(envelope, message_type)?))
            }
            MessageType::Pong => Ok(Self::Pong {
                request_id: envelope.request_id.clone().map(RequestId::from),
            }),
            other => Err(ProtocolError::WrongDirection(other)),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn known_type(envelope: &Envelope) -> Result<MessageType, ProtocolError> {
    MessageType::from_wire(&envelope.message_type)
        .ok_or_else(|| ProtocolError::UnknownType(envelope.message_type.clone()))
}

fn required_request_id(
    envelope: &Envelope,
    message_type: MessageType,
) -> Result<RequestId, ProtocolError> {
    envelope
        .request_id
        .clone()
        .filter(|id| !id.is_empty())
        .map(RequestId::from)
        .ok_or(ProtocolError::MissingRequestId(message_type))
}

fn payload<T: DeserializeOwned>(
    envelope: &Envelope,
    message_type: MessageType,
) -> Result<T, ProtocolError> {
    serde_json::from_value(envelope.payload_or_empty()).map_err(|e| {
        ProtocolError::InvalidPayload {
            message_type,
            reason: e.to_string(),
        }
    })
}
