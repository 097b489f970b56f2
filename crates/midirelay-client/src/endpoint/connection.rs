//! Endpoint state machine and the background socket tasks.

use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use midirelay_common::{ConnectionState, EventRouter};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::outbound::PendingQueue;

// ---------------------------------------------------------------------------
// Endpoint state
// ---------------------------------------------------------------------------

struct Inner {
    state: ConnectionState,
    pending: PendingQueue,
    /// Feeds the write task while the connection is open.
    writer: Option<mpsc::UnboundedSender<Message>>,
    /// A connect attempt is in flight.
    connecting: bool,
}

/// State shared between a [`RelayClient`](super::RelayClient) handle and its
/// connection task.
///
/// The lock is never held across an await, and the state change, the queue
/// drain and the writer hand-over on open all happen under it, so packets
/// reach the writer in the order `send_packet` was called.
pub(crate) struct Endpoint {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
    pub(crate) router: EventRouter,
}

impl Endpoint {
    pub(crate) fn new(router: EventRouter) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                pending: PendingQueue::new(),
                writer: None,
                connecting: false,
            }),
            state_tx,
            router,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, inner: &mut Inner, next: ConnectionState) -> bool {
        if !inner.state.can_transition_to(next) {
            return false;
        }
        debug!(from = %inner.state, to = %next, "Connection state change");
        inner.state = next;
        self.state_tx.send_replace(next);
        true
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    #[cfg(test)]
    pub(crate) fn pending_packets(&self) -> Vec<String> {
        self.lock().pending.iter().map(str::to_string).collect()
    }

    /// Claim the right to open a connection. Refused when already open,
    /// closing/closed, or while another attempt is in flight.
    pub(crate) fn begin_connect(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            ConnectionState::Open => {
                debug!("Already connected, ignoring connect");
                false
            }
            ConnectionState::Closing | ConnectionState::Closed => {
                warn!(state = %inner.state, "Endpoint has been closed, not reconnecting");
                false
            }
            ConnectionState::Connecting if inner.connecting => {
                debug!("Connect already in progress");
                false
            }
            ConnectionState::Connecting => {
                inner.connecting = true;
                true
            }
        }
    }

    /// The attempt failed; stay in `Connecting` with the queue intact.
    pub(crate) fn connect_failed(&self) {
        self.lock().connecting = false;
    }

    /// Move to `Open` and flush the queue into `writer`.
    ///
    /// Returns the number of flushed packets, or `None` if the endpoint was
    /// closed while the attempt was in flight.
    pub(crate) fn open(&self, writer: mpsc::UnboundedSender<Message>) -> Option<usize> {
        let mut inner = self.lock();
        inner.connecting = false;
        if !self.transition(&mut inner, ConnectionState::Open) {
            return None;
        }

        let packets = inner.pending.drain();
        let flushed = packets.len();
        for packet in packets {
            if writer.send(Message::Text(packet.into())).is_err() {
                warn!("Write task gone during flush, packet lost");
            }
        }
        inner.writer = Some(writer);
        Some(flushed)
    }

    /// Write now when open, queue while connecting, drop otherwise.
    pub(crate) fn send_packet(&self, packet: String) {
        let mut inner = self.lock();
        match inner.state {
            ConnectionState::Open => match &inner.writer {
                Some(writer) => {
                    if writer.send(Message::Text(packet.into())).is_err() {
                        warn!("Write task gone, packet lost");
                    }
                }
                None => warn!("Open endpoint has no writer, packet lost"),
            },
            ConnectionState::Connecting => {
                inner.pending.push(packet);
            }
            ConnectionState::Closing | ConnectionState::Closed => {
                debug!(state = %inner.state, "Dropping packet on closed endpoint");
            }
        }
    }

    /// Start an orderly shutdown.
    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        match inner.state {
            ConnectionState::Open => {
                self.transition(&mut inner, ConnectionState::Closing);
                if let Some(writer) = &inner.writer {
                    let _ = writer.send(Message::Close(None));
                }
            }
            ConnectionState::Connecting => {
                let dropped = inner.pending.discard();
                if dropped > 0 {
                    info!(dropped, "Closing before connect, discarding queued packets");
                }
                self.transition(&mut inner, ConnectionState::Closed);
            }
            ConnectionState::Closing | ConnectionState::Closed => {}
        }
    }

    /// The socket is gone.
    pub(crate) fn mark_closed(&self) {
        let mut inner = self.lock();
        inner.writer = None;
        self.transition(&mut inner, ConnectionState::Closed);
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Open the socket, flush, signal readiness, then pump inbound frames into
/// the router until the connection ends.
pub(crate) async fn run_connection(
    endpoint: Arc<Endpoint>,
    url: String,
    ready: oneshot::Sender<()>,
) {
    info!(url = %url, "Connecting to relay");

    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(url = %url, error = %e, "Failed to connect to relay");
            endpoint.connect_failed();
            return;
        }
    };

    let (sink, stream) = ws.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(sink, rx));

    let Some(flushed) = endpoint.open(tx.clone()) else {
        debug!(url = %url, "Endpoint closed while connecting, dropping socket");
        let _ = tx.send(Message::Close(None));
        drop(tx);
        let _ = writer.await;
        return;
    };
    drop(tx);

    info!(url = %url, flushed, "Connected to relay");
    let _ = ready.send(());

    read_loop(stream, &endpoint.router).await;

    endpoint.mark_closed();
    info!(url = %url, "Relay connection closed");
    let _ = writer.await;
}

/// Forward queued messages to the socket in order. Failures are logged and
/// the next message is still attempted.
async fn write_loop<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<Message>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg).await {
            warn!(error = %e, "WebSocket write failed");
        }
        if closing {
            break;
        }
    }
}

/// Dispatch inbound frames until the peer closes or the socket fails.
async fn read_loop<S>(mut stream: S, router: &EventRouter)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                router.deliver(&text);
            }
            Ok(Message::Binary(bytes)) => {
                router.deliver_bytes(&bytes);
            }
            Ok(Message::Close(_)) => {
                debug!("Relay sent close frame");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "WebSocket error");
                break;
            }
        }
    }
}
