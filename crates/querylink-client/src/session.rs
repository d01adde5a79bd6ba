//! Query session: the client-side record of one logical query at a time.
//!
//! ```text
//! idle ─▶ starting ─▶ running ─▶ done | error | canceled
//!            │
//!            └─(start failure)─▶ error
//! ```
//!
//! A running query that loses its connection ends in `error`.
//! Terminal states ignore further events. `run` always starts over with a
//! fresh record, and events for an earlier query ID no longer reach it.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use querylink_protocol::{ClientMessage, QueryId, QueryStats, Row};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::correlator::{AcceptHook, RequestCorrelator};
use crate::errors::ClientError;
use crate::event::QueryEvent;
use crate::registry::{Subscription, SubscriptionRegistry};

/// Lifecycle of a query as seen by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// Nothing has been run.
    #[default]
    Idle,
    /// `runQuery` sent, no query ID yet.
    Starting,
    /// Accepted and streaming.
    Running,
    /// Finished with stats.
    Done,
    /// Failed. See [`QueryResult::error`].
    Error,
    /// The server acknowledged a cancel.
    Canceled,
}

impl QueryStatus {
    /// Whether no further events change the record.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Canceled)
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last `queryProgress` report.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressReport {
    /// Server-side status label.
    pub status: Option<String>,
    /// Rows sent so far.
    pub rows_sent: Option<u64>,
}

/// Accumulated state of one query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult {
    /// Column names from the most recent rows batch.
    pub columns: Vec<String>,
    /// Every row received, in arrival order.
    pub rows: Vec<Row>,
    /// Current status.
    pub status: QueryStatus,
    /// Set iff `status` is `Error`.
    pub error: Option<String>,
    /// Set iff `status` is `Done`.
    pub stats: Option<QueryStats>,
    /// Server-assigned ID, once accepted.
    pub query_id: Option<QueryId>,
    /// Latest progress report.
    pub progress: Option<ProgressReport>,
}

impl QueryResult {
    /// Rows received so far.
    pub fn loaded_rows(&self) -> usize {
        self.rows.len()
    }

    /// Reset everything and enter `Starting`.
    pub fn begin(&mut self) {
        *self = Self {
            status: QueryStatus::Starting,
            ..Self::default()
        };
    }

    /// `Starting` → `Running`. Returns whether the record changed.
    pub fn accept(&mut self, query_id: QueryId) -> bool {
        if self.status != QueryStatus::Starting {
            return false;
        }
        self.query_id = Some(query_id);
        self.status = QueryStatus::Running;
        true
    }

    /// `Starting` → `Error`. Returns whether the record changed.
    pub fn fail_start(&mut self, message: impl Into<String>) -> bool {
        if self.status != QueryStatus::Starting {
            return false;
        }
        self.status = QueryStatus::Error;
        self.error = Some(message.into());
        true
    }

    /// Apply one streamed event. Only a `Running` record changes.
    ///
    /// Returns whether the record changed.
    pub fn apply(&mut self, event: &QueryEvent) -> bool {
        if self.status != QueryStatus::Running {
            return false;
        }
        match event {
            QueryEvent::Progress { status, rows_sent } => {
                self.progress = Some(ProgressReport {
                    status: status.clone(),
                    rows_sent: *rows_sent,
                });
            }
            QueryEvent::Rows { columns, rows } => {
                self.columns.clone_from(columns);
                self.rows.extend(rows.iter().cloned());
            }
            QueryEvent::Done { stats } => {
                self.status = QueryStatus::Done;
                self.stats = Some(*stats);
            }
            QueryEvent::Error { message } => {
                self.status = QueryStatus::Error;
                self.error = Some(message.clone());
            }
            QueryEvent::Canceled => {
                self.status = QueryStatus::Canceled;
            }
            QueryEvent::ConnectionLost { .. } => {
                self.status = QueryStatus::Error;
                self.error = Some("connection lost".to_string());
            }
        }
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

struct SessionState {
    result: QueryResult,
    generation: u64,
    subscription: Option<Subscription>,
}

struct SessionInner {
    state: Mutex<SessionState>,
    revision: watch::Sender<u64>,
    connection: Arc<ConnectionManager>,
    correlator: Arc<RequestCorrelator>,
    registry: SubscriptionRegistry,
}

impl SessionInner {
    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    fn on_accepted(self: &Arc<Self>, generation: u64, query_id: &QueryId) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription = self.registry.subscribe(query_id.clone(), move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_event(generation, event);
            }
        });

        let stale = {
            let mut state = self.state.lock();
            if state.generation == generation && state.result.accept(query_id.clone()) {
                state.subscription = Some(subscription);
                None
            } else {
                Some(subscription)
            }
        };

        if let Some(stale) = stale {
            debug!(query_id = %query_id, "accept for superseded run, dropping");
            stale.unsubscribe();
            return;
        }
        info!(query_id = %query_id, "query running");
        self.bump();
    }

    fn on_event(&self, generation: u64, event: &QueryEvent) {
        let finished = {
            let mut state = self.state.lock();
            if state.generation != generation || !state.result.apply(event) {
                return;
            }
            if state.result.status.is_terminal() {
                debug!(status = %state.result.status, loaded_rows = state.result.loaded_rows(), "query finished");
                state.subscription.take()
            } else {
                None
            }
        };
        drop(finished);
        self.bump();
    }

    fn on_start_failed(&self, generation: u64, error: &ClientError) {
        let changed = {
            let mut state = self.state.lock();
            state.generation == generation && state.result.fail_start(error.to_string())
        };
        if changed {
            self.bump();
        }
    }
}

/// Runs queries and tracks the latest one.
///
/// Cheap to clone; clones share the same record.
#[derive(Clone)]
pub struct QuerySession {
    inner: Arc<SessionInner>,
}

impl QuerySession {
    /// Create an idle session.
    pub fn new(
        connection: Arc<ConnectionManager>,
        correlator: Arc<RequestCorrelator>,
        registry: SubscriptionRegistry,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState {
                    result: QueryResult::default(),
                    generation: 0,
                    subscription: None,
                }),
                revision,
                connection,
                correlator,
                registry,
            }),
        }
    }

    /// Start `sql`, replacing whatever the session held.
    ///
    /// The record is reset to `Starting` before this first awaits. Returns
    /// the server-assigned query ID once accepted. On failure the record
    /// moves to `Error` and the error is also returned.
    pub async fn run(&self, sql: &str) -> Result<QueryId, ClientError> {
        let (generation, previous) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.result.begin();
            (state.generation, state.subscription.take())
        };
        drop(previous);
        self.inner.bump();

        let weak = Arc::downgrade(&self.inner);
        let hook: AcceptHook = Box::new(move |query_id: &QueryId| {
            if let Some(inner) = weak.upgrade() {
                inner.on_accepted(generation, query_id);
            }
        });

        match self
            .inner
            .correlator
            .start_query(&self.inner.connection, sql, Some(hook))
            .await
        {
            Ok(query_id) => Ok(query_id),
            Err(e) => {
                warn!(error = %e, "query failed to start");
                self.inner.on_start_failed(generation, &e);
                Err(e)
            }
        }
    }

    /// Ask the server to cancel the running query.
    ///
    /// Sends `cancelQuery` while `Running`. Fails with
    /// [`ClientError::QueryNotAccepted`] while `Starting`. A no-op otherwise.
    /// The record only becomes `Canceled` once the server confirms.
    pub async fn cancel(&self) -> Result<(), ClientError> {
        let (status, query_id) = {
            let state = self.inner.state.lock();
            (state.result.status, state.result.query_id.clone())
        };
        match (status, query_id) {
            (QueryStatus::Running, Some(query_id)) => {
                debug!(query_id = %query_id, "sending cancelQuery");
                self.inner
                    .connection
                    .send(&ClientMessage::CancelQuery { query_id })
                    .await
            }
            (QueryStatus::Starting | QueryStatus::Running, _) => Err(ClientError::QueryNotAccepted),
            _ => Ok(()),
        }
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> QueryResult {
        self.inner.state.lock().result.clone()
    }

    /// Current status.
    pub fn status(&self) -> QueryStatus {
        self.inner.state.lock().result.status
    }

    /// Rows received so far.
    pub fn loaded_rows(&self) -> usize {
        self.inner.state.lock().result.loaded_rows()
    }

    /// Server-assigned ID of the current query, once accepted.
    pub fn query_id(&self) -> Option<QueryId> {
        self.inner.state.lock().result.query_id.clone()
    }

    /// Receiver whose value is bumped on every change to the record.
    pub fn changed(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Wait until `predicate` holds for the record, and return that record.
    pub async fn wait_until<F>(&self, mut predicate: F) -> QueryResult
    where
        F: FnMut(&QueryResult) -> bool,
    {
        let mut changes = self.changed();
        loop {
            let snapshot = self.snapshot();
            if predicate(&snapshot) {
                return snapshot;
            }
            if changes.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    /// Wait for `Done`, `Error`, or `Canceled`.
    pub async fn wait_terminal(&self) -> QueryResult {
        self.wait_until(|r| r.status.is_terminal()).await
    }
}

impl fmt::Debug for QuerySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("QuerySession")
            .field("status", &state.result.status)
            .field("query_id", &state.result.query_id)
            .field("loaded_rows", &state.result.loaded_rows())
            .finish_non_exhaustive()
    }
}
