//! Per-query events delivered to subscribers.

use querylink_protocol::{QueryId, QueryStats, Row, ServerMessage};

/// Something that happened to one query.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryEvent {
    /// Liveness report.
    Progress {
        /// Server-side status string, if sent.
        status: Option<String>,
        /// Rows sent so far, if reported.
        rows_sent: Option<u64>,
    },
    /// A batch of rows.
    Rows {
        /// Column names for this batch.
        columns: Vec<String>,
        /// Rows in server order.
        rows: Vec<Row>,
    },
    /// The query finished.
    Done {
        /// Final statistics.
        stats: QueryStats,
    },
    /// The query failed on the server.
    Error {
        /// Server-provided message.
        message: String,
    },
    /// The server acknowledged a cancel.
    Canceled,
    /// The connection carrying the query dropped. The server does not resume
    /// queries, so no further events will arrive for it.
    ConnectionLost {
        /// Why the connection dropped.
        reason: String,
    },
}

impl QueryEvent {
    /// Split a query-bound server message into its query ID and event.
    ///
    /// Returns `None` for `queryAccepted` and `pong`.
    pub fn from_server(message: ServerMessage) -> Option<(QueryId, Self)> {
        let routed = match message {
            ServerMessage::QueryProgress(p) => (
                p.query_id,
                Self::Progress {
                    status: p.status,
                    rows_sent: p.rows_sent,
                },
            ),
            ServerMessage::QueryRows(p) => (
                p.query_id,
                Self::Rows {
                    columns: p.columns,
                    rows: p.rows,
                },
            ),
            ServerMessage::QueryDone(p) => (p.query_id, Self::Done { stats: p.stats }),
            ServerMessage::QueryError(p) => (p.query_id, Self::Error { message: p.message }),
            ServerMessage::QueryCanceled(p) => (p.query_id, Self::Canceled),
            ServerMessage::QueryAccepted { .. } | ServerMessage::Pong { .. } => return None,
        };
        Some(routed)
    }

    /// Whether this event ends the query.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Error { .. } | Self::Canceled | Self::ConnectionLost { .. }
        )
    }
}
