//! # querylink-client
//!
//! Client for the streaming query protocol: submit long-running SQL over one
//! persistent WebSocket, receive rows incrementally, cancel in flight, and
//! ride out transient disconnects.
//!
//! ## Components
//!
//! - [`ConnectionManager`]: owns the transport, keep-alive, reconnect backoff
//! - [`RequestCorrelator`]: matches `queryAccepted` to pending `runQuery`s
//! - [`SubscriptionRegistry`]: query ID → handler fan-out
//! - [`MessageRouter`]: decodes inbound frames and dispatches them
//! - [`QuerySession`]: per-query state machine (`idle` → `starting` →
//!   `running` → `done` / `error` / `canceled`)
//! - [`QueryClient`]: facade that wires the above together
//!
//! The `test-util` feature exposes the `memory` module, an in-process transport for
//! scripting the server side in tests.
//!
//! Inbound frames are processed one at a time on the connection's driver
//! task. Handlers run synchronously on that task and must not block.

#![deny(unsafe_code)]

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod errors;
pub mod event;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod registry;
pub mod router;
pub mod session;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use client::QueryClient;
pub use config::{ClientConfig, ConnectionConfig};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionStatus, InboundHandler};
pub use correlator::{AcceptHook, PendingRequest, RequestCorrelator};
pub use errors::{ClientError, TransportError};
pub use event::QueryEvent;
pub use registry::{EventHandler, Subscription, SubscriptionRegistry};
pub use router::MessageRouter;
pub use session::{ProgressReport, QueryResult, QuerySession, QueryStatus};
pub use transport::{Connector, FrameSink, FrameStream, Transport, WebSocketConnector};

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryConnector, MemoryServer, ServerEnd};

pub use querylink_protocol::{QueryId, QueryStats, RequestId, Row};
