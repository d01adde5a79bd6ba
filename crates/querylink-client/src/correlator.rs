//! Request correlator: matches `queryAccepted` replies to pending `runQuery`s.
//!
//! Each start registers a pending entry keyed by a fresh [`RequestId`] before
//! the frame is sent. Exactly one of three things then removes the entry:
//! the accept arriving, the timeout firing, or the waiter being dropped.
//! Whichever removes it decides the outcome, so an accept that loses the race
//! with the timeout is logged and ignored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use querylink_protocol::{ClientMessage, QueryId, RequestId};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::errors::ClientError;

/// Callback run on the inbound path the moment a request is accepted,
/// before any later frame is dispatched.
pub type AcceptHook = Box<dyn FnOnce(&QueryId) + Send>;

struct Pending {
    tx: oneshot::Sender<QueryId>,
    on_accept: Option<AcceptHook>,
}

/// Outstanding start requests.
pub struct RequestCorrelator {
    pending: Mutex<HashMap<RequestId, Pending>>,
    timeout: Duration,
}

impl RequestCorrelator {
    /// Create a correlator with the given accept timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Accept timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of requests awaiting an accept.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Register a pending request under a fresh request ID.
    pub fn register(self: &Arc<Self>, on_accept: Option<AcceptHook>) -> PendingRequest {
        let request_id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        let _ = self
            .pending
            .lock()
            .insert(request_id.clone(), Pending { tx, on_accept });
        PendingRequest {
            request_id,
            rx,
            correlator: Arc::clone(self),
        }
    }

    /// Route an accept to its pending request.
    ///
    /// Runs the accept hook, then wakes the waiter. Returns `false` if no
    /// request with that ID is pending (unknown, already timed out, or
    /// abandoned).
    pub fn resolve(&self, request_id: &RequestId, query_id: QueryId) -> bool {
        let Some(pending) = self.pending.lock().remove(request_id) else {
            warn!(
                request_id = %request_id,
                query_id = %query_id,
                "accept for unknown or expired request, ignoring"
            );
            return false;
        };
        debug!(request_id = %request_id, query_id = %query_id, "request accepted");
        if let Some(hook) = pending.on_accept {
            hook(&query_id);
        }
        let _ = pending.tx.send(query_id);
        true
    }

    /// Send `runQuery` and wait for the server to assign a query ID.
    ///
    /// Fails immediately with [`ClientError::ConnectionUnavailable`] when the
    /// connection is not open, and with [`ClientError::RequestTimeout`] when
    /// no accept arrives in time.
    pub async fn start_query(
        self: &Arc<Self>,
        connection: &ConnectionManager,
        sql: &str,
        on_accept: Option<AcceptHook>,
    ) -> Result<QueryId, ClientError> {
        if !connection.is_connected() {
            return Err(ClientError::ConnectionUnavailable {
                status: connection.status(),
            });
        }
        let pending = self.register(on_accept);
        let message = ClientMessage::RunQuery {
            request_id: pending.request_id().clone(),
            sql: sql.to_string(),
        };
        // Dropping `pending` on error discards the entry.
        connection.send(&message).await?;
        debug!(request_id = %pending.request_id(), "runQuery sent");
        pending.wait().await
    }
}

/// A registered request awaiting its accept.
///
/// Dropping it removes the pending entry.
pub struct PendingRequest {
    request_id: RequestId,
    rx: oneshot::Receiver<QueryId>,
    correlator: Arc<RequestCorrelator>,
}

impl PendingRequest {
    /// ID to put on the outgoing `runQuery`.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Wait for the accept, up to the correlator's timeout.
    pub async fn wait(mut self) -> Result<QueryId, ClientError> {
        let timeout = self.correlator.timeout;
        if let Ok(result) = tokio::time::timeout(timeout, &mut self.rx).await {
            return result.map_err(|_| self.timed_out());
        }

        let expired = self
            .correlator
            .pending
            .lock()
            .remove(&self.request_id)
            .is_some();
        if expired {
            warn!(request_id = %self.request_id, "request timed out waiting for accept");
            return Err(self.timed_out());
        }
        // The accept claimed the entry first; its value is on the way.
        (&mut self.rx).await.map_err(|_| self.timed_out())
    }

    fn timed_out(&self) -> ClientError {
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = self.correlator.timeout.as_millis() as u64;
        ClientError::RequestTimeout {
            request_id: self.request_id.clone(),
            timeout_ms,
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        let _ = self.correlator.pending.lock().remove(&self.request_id);
    }
}
