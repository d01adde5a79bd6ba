//! Envelope and payload types matching the JSON wire format.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::QueryId;

/// One result row: cell values in column order.
pub type Row = Vec<Value>;

// ─────────────────────────────────────────────────────────────────────────────
// Message type
// ─────────────────────────────────────────────────────────────────────────────

/// Every value the envelope `type` field can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    /// Client → server: start a query.
    RunQuery,
    /// Client → server: ask the server to stop a running query.
    CancelQuery,
    /// Client → server: keep-alive.
    Ping,
    /// Server → client: a `runQuery` was accepted and assigned a query ID.
    QueryAccepted,
    /// Server → client: liveness report for a running query.
    QueryProgress,
    /// Server → client: a batch of rows.
    QueryRows,
    /// Server → client: query finished successfully.
    QueryDone,
    /// Server → client: query failed.
    QueryError,
    /// Server → client: query was canceled.
    QueryCanceled,
    /// Server → client: keep-alive reply.
    Pong,
}

impl MessageType {
    /// All message types, client-bound last.
    pub const ALL: [Self; 10] = [
        Self::RunQuery,
        Self::CancelQuery,
        Self::Ping,
        Self::QueryAccepted,
        Self::QueryProgress,
        Self::QueryRows,
        Self::QueryDone,
        Self::QueryError,
        Self::QueryCanceled,
        Self::Pong,
    ];

    /// Wire name of this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunQuery => "runQuery",
            Self::CancelQuery => "cancelQuery",
            Self::Ping => "ping",
            Self::QueryAccepted => "queryAccepted",
            Self::QueryProgress => "queryProgress",
            Self::QueryRows => "queryRows",
            Self::QueryDone => "queryDone",
            Self::QueryError => "queryError",
            Self::QueryCanceled => "queryCanceled",
            Self::Pong => "pong",
        }
    }

    /// Look up a type by its wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Whether this type is sent by clients (as opposed to servers).
    pub fn is_client_message(self) -> bool {
        matches!(self, Self::RunQuery | Self::CancelQuery | Self::Ping)
    }

    /// Whether this type ends a query's event stream.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::QueryDone | Self::QueryError | Self::QueryCanceled
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// The untyped `{ type, requestId?, payload }` frame.
///
/// `message_type` stays a raw string here so an unknown type can be reported
/// by name instead of as a generic serde failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Wire message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Correlation ID (present on `runQuery` and `queryAccepted`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Type-specific payload; missing decodes as `{}`.
    #[serde(default = "empty_object")]
    pub payload: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Envelope {
    /// Build an envelope for a known type.
    pub fn new(message_type: MessageType, request_id: Option<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.as_str().to_owned(),
            request_id,
            payload,
        }
    }

    /// Payload with `null` normalized to `{}`.
    pub fn payload_or_empty(&self) -> Value {
        if self.payload.is_null() {
            empty_object()
        } else {
            self.payload.clone()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// `runQuery` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunQueryPayload {
    /// SQL text, passed through verbatim.
    pub sql: String,
}

/// `cancelQuery` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelQueryPayload {
    /// Query to cancel.
    pub query_id: QueryId,
}

/// `queryAccepted` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedPayload {
    /// ID the server assigned to the query.
    pub query_id: QueryId,
}

/// `queryProgress` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    /// Query the report is for.
    pub query_id: QueryId,
    /// Server-side status label (e.g. `running`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Rows the server has sent so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_sent: Option<u64>,
}

/// `queryRows` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsPayload {
    /// Query the batch belongs to.
    pub query_id: QueryId,
    /// Column names for the batch.
    pub columns: Vec<String>,
    /// Rows in server order.
    pub rows: Vec<Row>,
}

/// Execution statistics reported with `queryDone`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    /// Server-measured wall time in milliseconds.
    pub elapsed_ms: f64,
    /// Rows produced (or affected, for DML). Drivers report `-1` when the
    /// count is unknown, e.g. for DDL.
    pub total_rows: i64,
}

impl QueryStats {
    /// Row count, or `None` when the server reported it as unknown.
    pub fn row_count(&self) -> Option<u64> {
        u64::try_from(self.total_rows).ok()
    }
}

/// `queryDone` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonePayload {
    /// Query that finished.
    pub query_id: QueryId,
    /// Final statistics.
    pub stats: QueryStats,
}

/// `queryError` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Query that failed.
    pub query_id: QueryId,
    /// Server error message.
    pub message: String,
}

/// `queryCanceled` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanceledPayload {
    /// Query that was canceled.
    pub query_id: QueryId,
}
