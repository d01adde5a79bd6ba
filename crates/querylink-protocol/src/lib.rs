//! # querylink-protocol
//!
//! Wire format for the streaming query protocol spoken over a single
//! persistent WebSocket.
//!
//! - **Envelope**: `{ "type", "requestId"?, "payload" }` UTF-8 JSON frames
//! - **Message types**: `runQuery` / `cancelQuery` / `ping` (client → server) and
//!   `queryAccepted` / `queryProgress` / `queryRows` / `queryDone` /
//!   `queryError` / `queryCanceled` / `pong` (server → client)
//! - **IDs**: `RequestId` (client-generated, UUID v7) and `QueryId`
//!   (server-assigned, opaque) as distinct newtypes
//! - **Errors**: `ProtocolError` for frames that cannot be decoded

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod messages;
pub mod types;

pub use errors::ProtocolError;
pub use ids::{QueryId, RequestId};
pub use messages::{ClientMessage, ServerMessage};
pub use types::{
    AcceptedPayload, CancelQueryPayload, CanceledPayload, DonePayload, Envelope, ErrorPayload,
    MessageType, ProgressPayload, QueryStats, Row, RowsPayload, RunQueryPayload,
};
