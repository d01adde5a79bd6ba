//! Client error types.

use querylink_protocol::{ProtocolError, RequestId};
use thiserror::Error;

use crate::connection::ConnectionStatus;

/// Errors returned to callers of the query client.
///
/// Only handshake and send failures are returned. Server-side query failures
/// and cancellation acknowledgements are terminal session states, not errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A start or cancel was attempted while the connection was not open.
    #[error("connection unavailable (status: {status})")]
    ConnectionUnavailable {
        /// Connection status at the time of the attempt.
        status: ConnectionStatus,
    },

    /// No `queryAccepted` arrived within the accept timeout.
    #[error("request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request that timed out.
        request_id: RequestId,
        /// Configured accept timeout.
        timeout_ms: u64,
    },

    /// Cancel was requested before the server assigned a query ID.
    #[error("query has not been accepted yet")]
    QueryNotAccepted,

    /// The live transport closed while a frame was being enqueued.
    #[error("transport closed")]
    TransportClosed,

    /// Dialing the endpoint failed.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Endpoint that was dialed (token redacted).
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// An outbound message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] ProtocolError),

    /// The configured endpoint is not a usable WebSocket URL.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The endpoint as configured.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors raised by a [`Connector`](crate::transport::Connector) or a live
/// transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The dial did not produce a connection.
    #[error("dial failed: {0}")]
    Dial(String),
    /// Reading or writing a frame failed.
    #[error("transport I/O error: {0}")]
    Io(String),
    /// The other side has gone away.
    #[error("transport closed")]
    Closed,
}
