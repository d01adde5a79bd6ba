//! In-process transport for scripting the server side in tests.
//!
//! Compiled for this crate's own tests and behind the `test-util` feature.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Sink, SinkExt, StreamExt};
use querylink_protocol::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::PollSender;
use url::Url;

use crate::errors::TransportError;
use crate::transport::{Connector, FrameSink, Transport};

const MEMORY_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct Knobs {
    refuse: AtomicBool,
    stall_close: AtomicBool,
    dial_count: AtomicUsize,
}

/// Connector that pairs each dial with a [`ServerEnd`] in the same process.
#[derive(Clone)]
pub struct MemoryConnector {
    dials: mpsc::UnboundedSender<ServerEnd>,
    knobs: Arc<Knobs>,
}

/// Accepting side of a [`MemoryConnector`].
pub struct MemoryServer {
    dials: mpsc::UnboundedReceiver<ServerEnd>,
    knobs: Arc<Knobs>,
}

impl MemoryConnector {
    /// Create a connector and the server that receives its dials.
    pub fn pair() -> (Self, MemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let knobs = Arc::new(Knobs::default());
        (
            Self {
                dials: tx,
                knobs: Arc::clone(&knobs),
            },
            MemoryServer { dials: rx, knobs },
        )
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &Url) -> Result<Transport, TransportError> {
        let _ = self.knobs.dial_count.fetch_add(1, Ordering::SeqCst);
        if self.knobs.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Dial("connection refused".into()));
        }

        let (client_tx, client_rx) = mpsc::channel::<String>(MEMORY_CHANNEL_CAPACITY);
        let (server_tx, server_rx) = mpsc::channel::<String>(MEMORY_CHANNEL_CAPACITY);

        let end = ServerEnd {
            url: url.clone(),
            from_client: client_rx,
            to_client: Some(server_tx),
        };
        self.dials
            .send(end)
            .map_err(|_| TransportError::Dial("memory server dropped".into()))?;

        let mut sink: FrameSink =
            Box::pin(PollSender::new(client_tx).sink_map_err(|_| TransportError::Closed));
        if self.knobs.stall_close.load(Ordering::SeqCst) {
            sink = Box::pin(StalledClose { inner: sink });
        }
        let stream = ReceiverStream::new(server_rx).map(Ok::<String, TransportError>);

        Ok(Transport {
            sink,
            stream: Box::pin(stream),
        })
    }
}

impl MemoryServer {
    /// Wait for the next successful dial.
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.dials.recv().await
    }

    /// Make subsequent dials fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        self.knobs.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Give subsequent dials a sink whose close never completes, like a peer
    /// that never answers the close handshake.
    pub fn set_stall_close(&self, stall: bool) {
        self.knobs.stall_close.store(stall, Ordering::SeqCst);
    }

    /// Total dials attempted, refused ones included.
    pub fn dial_count(&self) -> usize {
        self.knobs.dial_count.load(Ordering::SeqCst)
    }
}

/// Passes frames through but never finishes closing.
struct StalledClose {
    inner: FrameSink,
}

impl Sink<String> for StalledClose {
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.as_mut().poll_ready(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: String) -> Result<(), Self::Error> {
        self.inner.as_mut().start_send(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }
}

/// Server side of one in-memory connection.
pub struct ServerEnd {
    url: Url,
    from_client: mpsc::Receiver<String>,
    to_client: Option<mpsc::Sender<String>>,
}

impl ServerEnd {
    /// URL the client dialed.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send a raw text frame. Returns `false` if the client is gone.
    pub async fn send_text(&self, frame: impl Into<String>) -> bool {
        match &self.to_client {
            Some(tx) => tx.send(frame.into()).await.is_ok(),
            None => false,
        }
    }

    /// Encode and send a server message.
    pub async fn send(&self, message: &ServerMessage) -> bool {
        match message.encode() {
            Ok(frame) => self.send_text(frame).await,
            Err(_) => false,
        }
    }

    /// Next raw frame from the client, or `None` once the client hung up.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next decodable frame from the client, skipping undecodable ones.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        loop {
            let frame = self.from_client.recv().await?;
            if let Ok(message) = ClientMessage::decode(&frame) {
                return Some(message);
            }
        }
    }

    /// Close the server side. The client sees the stream end.
    pub fn close(&mut self) {
        self.to_client = None;
        self.from_client.close();
    }
}
