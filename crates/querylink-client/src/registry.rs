//! Subscription registry: query ID → handler set, with fan-out.
//!
//! Handlers are invoked outside the registry lock against a snapshot taken at
//! the start of each emission, so a handler may subscribe or unsubscribe
//! (itself included) without deadlocking. Such changes apply from the next
//! emission on.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use querylink_protocol::QueryId;
use tracing::debug;

use crate::event::QueryEvent;

/// Callback invoked for every event of a subscribed query.
pub type EventHandler = Arc<dyn Fn(&QueryEvent) + Send + Sync>;

type HandlerId = u64;

#[derive(Default)]
struct RegistryInner {
    next_id: HandlerId,
    subscriptions: HashMap<QueryId, Vec<(HandlerId, EventHandler)>>,
}

impl RegistryInner {
    fn remove(&mut self, query_id: &QueryId, handler_id: HandlerId) -> bool {
        let Some(handlers) = self.subscriptions.get_mut(query_id) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != handler_id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            let _ = self.subscriptions.remove(query_id);
        }
        removed
    }
}

/// Multimap of query ID to handlers. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `query_id`.
    pub fn subscribe<F>(&self, query_id: QueryId, handler: F) -> Subscription
    where
        F: Fn(&QueryEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let handler_id = inner.next_id;
        inner
            .subscriptions
            .entry(query_id.clone())
            .or_default()
            .push((handler_id, Arc::new(handler)));
        drop(inner);

        debug!(query_id = %query_id, handler_id, "subscribed");
        Subscription {
            registry: Arc::downgrade(&self.inner),
            query_id,
            handler_id,
            active: true,
        }
    }

    /// Deliver `event` to every handler registered for `query_id`.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, query_id: &QueryId, event: &QueryEvent) -> usize {
        let snapshot: Vec<EventHandler> = match self.inner.lock().subscriptions.get(query_id) {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };
        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }

    /// Deliver `event` to every handler of every subscribed query.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit_all(&self, event: &QueryEvent) -> usize {
        let snapshot: Vec<EventHandler> = self
            .inner
            .lock()
            .subscriptions
            .values()
            .flat_map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)))
            .collect();
        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }

    /// Whether any handler is registered for `query_id`.
    pub fn contains(&self, query_id: &QueryId) -> bool {
        self.inner.lock().subscriptions.contains_key(query_id)
    }

    /// Number of handlers registered for `query_id`.
    pub fn handler_count(&self, query_id: &QueryId) -> usize {
        self.inner
            .lock()
            .subscriptions
            .get(query_id)
            .map_or(0, Vec::len)
    }

    /// Number of queries with at least one handler.
    pub fn len(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    /// Whether no query has a handler.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().subscriptions.is_empty()
    }

    /// Queries with at least one handler, in no particular order.
    pub fn query_ids(&self) -> Vec<QueryId> {
        self.inner.lock().subscriptions.keys().cloned().collect()
    }
}

/// Handle for one registered handler.
///
/// Dropping the handle unsubscribes. Call [`unsubscribe`](Self::unsubscribe)
/// to make that explicit.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    registry: Weak<Mutex<RegistryInner>>,
    query_id: QueryId,
    handler_id: HandlerId,
    active: bool,
}

impl Subscription {
    /// Query this subscription is for.
    pub fn query_id(&self) -> &QueryId {
        &self.query_id
    }

    /// Remove the handler. It receives nothing afterwards.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            let removed = registry.lock().remove(&self.query_id, self.handler_id);
            if removed {
                debug!(query_id = %self.query_id, handler_id = self.handler_id, "unsubscribed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("query_id", &self.query_id)
            .field("handler_id", &self.handler_id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
