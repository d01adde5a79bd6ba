//! Inbound message router.

use std::sync::Arc;

use querylink_protocol::ServerMessage;
use tracing::{debug, trace, warn};

use crate::connection::InboundHandler;
use crate::correlator::RequestCorrelator;
use crate::event::QueryEvent;
use crate::registry::SubscriptionRegistry;

/// Decodes inbound frames and dispatches them.
///
/// Accepts go to the correlator. Query-bound messages fan out through the
/// registry. Undecodable frames are logged and dropped.
pub struct MessageRouter {
    correlator: Arc<RequestCorrelator>,
    registry: SubscriptionRegistry,
}

impl MessageRouter {
    /// Create a router over the given correlator and registry.
    pub fn new(correlator: Arc<RequestCorrelator>, registry: SubscriptionRegistry) -> Self {
        Self {
            correlator,
            registry,
        }
    }

    /// Dispatch one decoded message.
    pub fn route(&self, message: ServerMessage) {
        let message_type = message.message_type();
        match message {
            ServerMessage::QueryAccepted {
                request_id,
                query_id,
            } => {
                let _ = self.correlator.resolve(&request_id, query_id);
            }
            ServerMessage::Pong { request_id } => {
                trace!(request_id = ?request_id, "pong");
            }
            other => {
                let Some((query_id, event)) = QueryEvent::from_server(other) else {
                    return;
                };
                let delivered = self.registry.emit(&query_id, &event);
                if delivered == 0 {
                    debug!(%message_type, query_id = %query_id, "no subscribers, dropping event");
                } else {
                    trace!(%message_type, query_id = %query_id, delivered, "dispatched");
                }
            }
        }
    }
}

impl InboundHandler for MessageRouter {
    fn on_frame(&self, frame: &str) {
        match ServerMessage::decode(frame) {
            Ok(message) => self.route(message),
            Err(e) => warn!(error = %e, len = frame.len(), "dropping malformed frame"),
        }
    }

    fn on_disconnect(&self, reason: &str) {
        let affected = self.registry.len();
        if affected == 0 {
            return;
        }
        debug!(affected, %reason, "notifying subscribers of connection loss");
        let _ = self.registry.emit_all(&QueryEvent::ConnectionLost {
            reason: reason.to_string(),
        });
    }
}
