//! Connection manager: one persistent transport with keep-alive and reconnect.
//!
//! `connect()` spawns a driver task that owns the transport. The driver:
//! - dials through the configured [`Connector`]
//! - forwards queued outbound frames and keep-alive pings to the sink
//! - hands every inbound text frame to the [`InboundHandler`], in order
//! - on close, schedules a reconnect with capped exponential backoff until the
//!   policy gives up
//!
//! Every state change the driver makes is tagged with the generation it was
//! started under. `disconnect()` bumps the generation, so a driver that is
//! still winding down can no longer touch status, events, or the outbound
//! queue of a newer connection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use querylink_protocol::ClientMessage;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use crate::config::{ConnectionConfig, redact};
use crate::errors::ClientError;
use crate::transport::{Connector, FrameSink, Transport};

const EVENT_CHANNEL_CAPACITY: usize = 64;
/// Upper bound on waiting for the peer to finish a close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection lifecycle status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// No transport, no dial in progress.
    #[default]
    Disconnected,
    /// Dial in progress.
    Connecting,
    /// Transport open.
    Connected,
}

impl ConnectionStatus {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle notifications, broadcast to every observer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transport opened.
    Connected,
    /// Transport closed, or a dial failed.
    Disconnected {
        /// Human-readable cause.
        reason: String,
    },
    /// A reconnect will be attempted after `delay`.
    ReconnectScheduled {
        /// One-based attempt number.
        attempt: u32,
        /// Wait before dialing.
        delay: Duration,
    },
    /// The reconnect policy gave up. No further attempts are made until the
    /// next `connect()`.
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

/// Receives everything the driver reads off the transport.
///
/// Both methods run on the driver task, one call at a time, so frames are
/// observed in arrival order. Implementations must not block.
pub trait InboundHandler: Send + Sync + 'static {
    /// One inbound text frame.
    fn on_frame(&self, frame: &str);
    /// The open transport went away.
    fn on_disconnect(&self, reason: &str);
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Link {
    generation: u64,
    active: bool,
    cancel: Option<CancellationToken>,
    outbound: Option<mpsc::Sender<String>>,
}

struct Shared {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn InboundHandler>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
    link: Mutex<Link>,
}

impl Shared {
    /// Run `f` against the link if `generation` is still current.
    fn with_current<R>(&self, generation: u64, f: impl FnOnce(&mut Link) -> R) -> Option<R> {
        let mut link = self.link.lock();
        (link.generation == generation).then(|| f(&mut link))
    }

    fn set_status(&self, status: ConnectionStatus) {
        let _ = self.status.send_replace(status);
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn mark_connecting(&self, generation: u64) -> bool {
        self.with_current(generation, |_| self.set_status(ConnectionStatus::Connecting))
            .is_some()
    }

    fn mark_connected(&self, generation: u64, outbound: mpsc::Sender<String>) -> bool {
        self.with_current(generation, |link| {
            link.outbound = Some(outbound);
            self.set_status(ConnectionStatus::Connected);
            self.emit(ConnectionEvent::Connected);
        })
        .is_some()
    }

    fn mark_disconnected(&self, generation: u64, reason: &str) -> bool {
        self.with_current(generation, |link| {
            link.outbound = None;
            self.set_status(ConnectionStatus::Disconnected);
            self.emit(ConnectionEvent::Disconnected {
                reason: reason.to_string(),
            });
        })
        .is_some()
    }

    fn emit_current(&self, generation: u64, event: ConnectionEvent) -> bool {
        self.with_current(generation, |_| self.emit(event)).is_some()
    }

    fn finish(&self, generation: u64) {
        let _ = self.with_current(generation, |link| {
            link.active = false;
            link.cancel = None;
            link.outbound = None;
            // Wake status waiters so they notice the driver is gone.
            self.set_status(ConnectionStatus::Disconnected);
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the single persistent connection.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager. Nothing is dialed until [`connect`](Self::connect).
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn InboundHandler>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                handler,
                status,
                events,
                link: Mutex::new(Link::default()),
            }),
        }
    }

    /// Start connecting.
    ///
    /// A no-op while a driver is already connected, dialing, or waiting out a
    /// backoff delay. After `disconnect()` or reconnect exhaustion this starts
    /// over with a fresh attempt counter. Must be called within a tokio
    /// runtime.
    pub fn connect(&self, token: Option<&str>) -> Result<(), ClientError> {
        let url = self.shared.config.endpoint_url(token)?;

        let mut link = self.shared.link.lock();
        if link.active {
            debug!("connect ignored, driver already active");
            return Ok(());
        }
        link.generation += 1;
        link.active = true;
        let cancel = CancellationToken::new();
        link.cancel = Some(cancel.clone());
        let generation = link.generation;
        self.shared.set_status(ConnectionStatus::Connecting);
        drop(link);

        let span = info_span!("connection", generation, url = %redact(&url));
        let shared = Arc::clone(&self.shared);
        let _ = tokio::spawn(drive(shared, generation, url, cancel).instrument(span));
        Ok(())
    }

    /// Close the connection and stop reconnecting.
    ///
    /// The handler's `on_disconnect` runs before this returns when the
    /// transport was open. The old driver closes its transport in the
    /// background and never reports anything afterwards.
    pub fn disconnect(&self) {
        let mut link = self.shared.link.lock();
        if !link.active {
            return;
        }
        if let Some(cancel) = link.cancel.take() {
            cancel.cancel();
        }
        let was_open = link.outbound.take().is_some();
        link.generation += 1;
        link.active = false;
        self.shared.set_status(ConnectionStatus::Disconnected);
        self.shared.emit(ConnectionEvent::Disconnected {
            reason: "disconnected by client".into(),
        });
        drop(link);
        info!("disconnected by client");
        if was_open {
            self.shared.handler.on_disconnect("disconnected by client");
        }
    }

    /// Queue one message for transmission.
    ///
    /// Fails with [`ClientError::ConnectionUnavailable`] without transmitting
    /// when the transport is not open.
    pub async fn send(&self, message: &ClientMessage) -> Result<(), ClientError> {
        let frame = message.encode()?;
        let outbound = self.shared.link.lock().outbound.clone();
        let Some(outbound) = outbound else {
            return Err(ClientError::ConnectionUnavailable {
                status: self.status(),
            });
        };
        outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::TransportClosed)
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Whether the transport is open.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Whether a driver is running (connected, dialing, or backing off).
    pub fn is_active(&self) -> bool {
        self.shared.link.lock().active
    }

    /// Watch status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until the transport is open.
    ///
    /// Fails with [`ClientError::ConnectionUnavailable`] if no driver is
    /// running or the driver stops without connecting.
    pub async fn wait_connected(&self) -> Result<(), ClientError> {
        let mut rx = self.watch_status();
        loop {
            let status = *rx.borrow_and_update();
            if status == ConnectionStatus::Connected {
                return Ok(());
            }
            if !self.is_active() {
                return Err(ClientError::ConnectionUnavailable { status });
            }
            if rx.changed().await.is_err() {
                return Err(ClientError::ConnectionUnavailable { status });
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(cancel) = self.shared.link.lock().cancel.take() {
            cancel.cancel();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

async fn drive(shared: Arc<Shared>, generation: u64, url: Url, cancel: CancellationToken) {
    let policy = shared.config.reconnect;
    let mut attempt: u32 = 0;

    loop {
        if !shared.mark_connecting(generation) {
            return;
        }

        let dialed = tokio::select! {
            () = cancel.cancelled() => return,
            result = shared.connector.connect(&url) => result,
        };

        let reason = match dialed {
            Ok(transport) => {
                attempt = 0;
                match serve(&shared, generation, transport, &cancel).await {
                    Some(reason) => {
                        if !shared.mark_disconnected(generation, &reason) {
                            return;
                        }
                        info!(%reason, "connection closed");
                        shared.handler.on_disconnect(&reason);
                        reason
                    }
                    None => return,
                }
            }
            Err(e) => {
                let reason = ClientError::Connect {
                    url: redact(&url),
                    reason: e.to_string(),
                }
                .to_string();
                warn!(attempt, error = %e, "dial failed");
                if !shared.mark_disconnected(generation, &reason) {
                    return;
                }
                reason
            }
        };

        if !policy.enabled {
            debug!(%reason, "reconnect disabled");
            shared.finish(generation);
            return;
        }

        let Some(delay) = policy.next_delay(attempt) else {
            warn!(attempts = attempt, "reconnect attempts exhausted, giving up");
            let _ = shared.emit_current(
                generation,
                ConnectionEvent::ReconnectExhausted { attempts: attempt },
            );
            shared.finish(generation);
            return;
        };

        attempt += 1;
        #[allow(clippy::cast_possible_truncation)]
        let delay_ms = delay.as_millis() as u64;
        info!(attempt, delay_ms, "scheduling reconnect");
        if !shared.emit_current(generation, ConnectionEvent::ReconnectScheduled { attempt, delay }) {
            return;
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = time::sleep(delay) => {}
        }
    }
}

/// Pump one open transport until it closes.
///
/// Returns the close reason, or `None` if the driver was cancelled.
async fn serve(
    shared: &Shared,
    generation: u64,
    transport: Transport,
    cancel: &CancellationToken,
) -> Option<String> {
    let Transport {
        mut sink,
        mut stream,
    } = transport;
    let (tx, mut rx) = mpsc::channel::<String>(shared.config.outbound_buffer.max(1));
    if !shared.mark_connected(generation, tx) {
        close_sink(&mut sink).await;
        return None;
    }
    info!("connected");

    let mut keepalive = shared.config.keepalive_interval.map(keepalive_timer);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                close_sink(&mut sink).await;
                return None;
            }
            frame = stream.next() => match frame {
                Some(Ok(text)) => shared.handler.on_frame(&text),
                Some(Err(e)) => return Some(format!("transport error: {e}")),
                None => return Some("connection closed by peer".to_string()),
            },
            Some(frame) = rx.recv() => {
                if let Err(e) = sink.send(frame).await {
                    warn!(error = %e, "send failed");
                    return Some(format!("send failed: {e}"));
                }
            }
            () = tick(&mut keepalive) => {
                match ClientMessage::Ping.encode() {
                    Ok(ping) => {
                        if let Err(e) = sink.send(ping).await {
                            warn!(error = %e, "keep-alive ping failed");
                            return Some(format!("send failed: {e}"));
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to encode ping"),
                }
            }
        }
    }
}

/// Close the sink, giving up after [`CLOSE_TIMEOUT`].
async fn close_sink(sink: &mut FrameSink) {
    match time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "close failed"),
        Err(_) => warn!(timeout = ?CLOSE_TIMEOUT, "close handshake timed out, dropping transport"),
    }
}

/// Interval whose first tick is one full period away.
fn keepalive_timer(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
