//! `QueryClient`: the public facade wiring all components together.

use std::sync::Arc;

use parking_lot::Mutex;
use querylink_protocol::{ClientMessage, QueryId};
use querylink_settings::ClientSettings;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionStatus, InboundHandler};
use crate::correlator::{AcceptHook, RequestCorrelator};
use crate::errors::ClientError;
use crate::event::QueryEvent;
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::router::MessageRouter;
use crate::session::QuerySession;
use crate::transport::{Connector, WebSocketConnector};

/// Client for the streaming query protocol.
///
/// Owns one connection, multiplexed across any number of queries by query ID.
pub struct QueryClient {
    connection: Arc<ConnectionManager>,
    correlator: Arc<RequestCorrelator>,
    registry: SubscriptionRegistry,
}

impl QueryClient {
    /// Build a client over an arbitrary connector.
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let correlator = Arc::new(RequestCorrelator::new(config.request_timeout));
        let registry = SubscriptionRegistry::new();
        let router: Arc<dyn InboundHandler> = Arc::new(MessageRouter::new(
            Arc::clone(&correlator),
            registry.clone(),
        ));
        let connection = Arc::new(ConnectionManager::new(config.connection, connector, router));
        Self {
            connection,
            correlator,
            registry,
        }
    }

    /// Build a client that dials over WebSocket.
    pub fn websocket(config: ClientConfig) -> Self {
        Self::new(config, Arc::new(WebSocketConnector))
    }

    /// Build a WebSocket client from loaded settings.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::websocket(ClientConfig::from(settings))
    }

    /// Start connecting. See [`ConnectionManager::connect`].
    pub fn connect(&self, token: Option<&str>) -> Result<(), ClientError> {
        self.connection.connect(token)
    }

    /// Wait until the connection is open.
    pub async fn wait_connected(&self) -> Result<(), ClientError> {
        self.connection.wait_connected().await
    }

    /// Close the connection without reconnecting.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Start a query and return its server-assigned ID.
    ///
    /// Events that arrive before the caller subscribes are not buffered. Use
    /// [`run_query_with`](Self::run_query_with) or a [`QuerySession`] to
    /// observe a query from its first event.
    pub async fn run_query(&self, sql: &str) -> Result<QueryId, ClientError> {
        self.correlator.start_query(&self.connection, sql, None).await
    }

    /// Start a query with `handler` subscribed at the moment it is accepted.
    pub async fn run_query_with<F>(
        &self,
        sql: &str,
        handler: F,
    ) -> Result<(QueryId, Subscription), ClientError>
    where
        F: Fn(&QueryEvent) + Send + Sync + 'static,
    {
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::default();
        let registry = self.registry.clone();
        let slot_in = Arc::clone(&slot);
        let hook: AcceptHook = Box::new(move |query_id: &QueryId| {
            *slot_in.lock() = Some(registry.subscribe(query_id.clone(), handler));
        });

        let query_id = self
            .correlator
            .start_query(&self.connection, sql, Some(hook))
            .await?;
        // The hook runs before the waiter is woken, so the slot is filled.
        let subscription = slot.lock().take().ok_or(ClientError::QueryNotAccepted)?;
        Ok((query_id, subscription))
    }

    /// Send `cancelQuery` for `query_id`. Fire-and-forget.
    pub async fn cancel_query(&self, query_id: &QueryId) -> Result<(), ClientError> {
        debug!(query_id = %query_id, "sending cancelQuery");
        self.connection
            .send(&ClientMessage::CancelQuery {
                query_id: query_id.clone(),
            })
            .await
    }

    /// Register `handler` for events of `query_id`.
    pub fn subscribe<F>(&self, query_id: QueryId, handler: F) -> Subscription
    where
        F: Fn(&QueryEvent) + Send + Sync + 'static,
    {
        self.registry.subscribe(query_id, handler)
    }

    /// New idle session bound to this client's connection.
    pub fn session(&self) -> QuerySession {
        QuerySession::new(
            Arc::clone(&self.connection),
            Arc::clone(&self.correlator),
            self.registry.clone(),
        )
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Watch connection status.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    /// Subscribe to connection lifecycle events.
    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.events()
    }

    /// The subscription registry shared by this client.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Requests awaiting `queryAccepted`.
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }
}
