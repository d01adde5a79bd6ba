//! Duplex text-frame transports.
//!
//! The connection manager never dials sockets directly. It asks a
//! [`Connector`] for a [`Transport`]: a sink of outbound text frames paired
//! with a stream of inbound ones.
//!
//! [`WebSocketConnector`] dials a real server with `tokio-tungstenite`.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use crate::errors::TransportError;

/// Outbound half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a transport. The stream ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// A live connection.
pub struct Transport {
    /// Frames to the server.
    pub sink: FrameSink,
    /// Frames from the server.
    pub stream: FrameStream,
}

/// Dials the endpoint and returns a live transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open one connection to `url`.
    async fn connect(&self, url: &Url) -> Result<Transport, TransportError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// Connector backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<Transport, TransportError> {
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Dial(e.to_string()))?;
        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(|e| TransportError::Io(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::text(text))));

        let stream = read.filter_map(|msg| future::ready(inbound_text(msg)));

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Map a WebSocket message to an inbound text frame.
///
/// Binary frames holding valid UTF-8 are treated as text. Control frames are
/// handled by tungstenite and skipped here.
fn inbound_text(
    msg: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<String, TransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(text)),
            Err(_) => {
                warn!(len = bytes.len(), "dropping non-UTF-8 binary frame");
                None
            }
        },
        Ok(Message::Close(frame)) => {
            debug!(?frame, "server sent close");
            None
        }
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(TransportError::Io(e.to_string()))),
    }
}
