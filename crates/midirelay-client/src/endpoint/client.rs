//! Public handle for producing to and listening on the relay.

use std::sync::Arc;
use std::time::Duration;

use midirelay_common::{ConnectionState, Envelope, EventRouter, KeyIndex, NoteEvent};
use midirelay_config::ClientConfig;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::warn;

use super::connection::{run_connection, Endpoint};
use crate::target::Target;

/// How long a tapped key stays down.
pub const TAP_DURATION: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for one relay connection.
///
/// Sends issued before the connection opens are queued and flushed, in
/// order, the moment it does. Clones share the same connection.
#[derive(Clone)]
pub struct RelayClient {
    endpoint: Arc<Endpoint>,
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayClient {
    pub fn new() -> Self {
        Self::with_router(EventRouter::new())
    }

    /// Build a client whose inbound events go to `router`.
    pub fn with_router(router: EventRouter) -> Self {
        Self {
            endpoint: Arc::new(Endpoint::new(router)),
        }
    }

    /// Start connecting in the background.
    ///
    /// Returns a receiver that resolves once the connection is open and the
    /// queue has been flushed. Returns `None` when nothing was started: the
    /// endpoint is already open or connecting, it has been closed, or the
    /// config names no usable host. A failed attempt drops the sender.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, config: &ClientConfig) -> Option<oneshot::Receiver<()>> {
        let target = match Target::resolve(config) {
            Ok(target) => target,
            Err(e) => {
                warn!(error = %e, "Not connecting");
                return None;
            }
        };

        if !self.endpoint.begin_connect() {
            return None;
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(run_connection(
            Arc::clone(&self.endpoint),
            target.url(),
            ready_tx,
        ));
        Some(ready_rx)
    }

    /// Send `data` under `event`.
    pub fn send(&self, event: &str, data: Value) {
        if event.trim().is_empty() {
            warn!("Refusing to send an event with an empty name");
            return;
        }
        self.send_envelope(&Envelope::new(event, data));
    }

    pub fn send_note(&self, note: NoteEvent) {
        self.send_envelope(&note.to_envelope());
    }

    /// Press `key` at full velocity and release it after [`TAP_DURATION`].
    pub async fn tap(&self, key: KeyIndex) {
        self.send_note(NoteEvent::NoteOn {
            note: key,
            velocity: midirelay_common::note::MAX_VELOCITY,
        });
        tokio::time::sleep(TAP_DURATION).await;
        self.send_note(NoteEvent::NoteOff { note: key });
    }

    fn send_envelope(&self, envelope: &Envelope) {
        match envelope.encode() {
            Ok(packet) => self.send_packet(packet),
            Err(e) => warn!(event = %envelope.event, error = %e, "Failed to encode envelope"),
        }
    }

    /// Send an already-serialized envelope.
    pub fn send_packet(&self, packet: String) {
        self.endpoint.send_packet(packet);
    }

    /// Register a handler for events arriving from the relay.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.endpoint.router.on(event, handler);
    }

    pub fn on_note<F>(&self, handler: F)
    where
        F: Fn(NoteEvent) + Send + Sync + 'static,
    {
        self.endpoint.router.on_note(handler);
    }

    pub fn subscribe_notes(&self) -> mpsc::UnboundedReceiver<NoteEvent> {
        self.endpoint.router.subscribe_notes()
    }

    pub fn router(&self) -> &EventRouter {
        &self.endpoint.router
    }

    pub fn state(&self) -> ConnectionState {
        self.endpoint.state()
    }

    /// Watch state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.endpoint.watch_state()
    }

    /// Number of packets waiting for the connection to open.
    pub fn pending_len(&self) -> usize {
        self.endpoint.pending_len()
    }

    /// Close the connection. Packets still queued are discarded.
    pub fn close(&self) {
        self.endpoint.close();
    }

    /// Wait until the endpoint reaches `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.watch_state();
        let _ = rx.wait_for(|state| state.is_terminal()).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    /// Accepts WebSocket connections, records every text frame and counts
    /// connections. Optionally sends `greeting` to each new peer.
    struct TestServer {
        port: u16,
        frames: mpsc::UnboundedReceiver<String>,
        accepted: Arc<AtomicUsize>,
    }

    async fn test_server(greeting: Option<String>) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, frames) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let tx = tx.clone();
                let greeting = greeting.clone();
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    if let Some(text) = greeting {
                        ws.send(Message::Text(text.into())).await.unwrap();
                    }
                    while let Some(Ok(msg)) = ws.next().await {
                        if let Message::Text(text) = msg {
                            let _ = tx.send(text.as_str().to_string());
                        }
                    }
                });
            }
        });

        TestServer {
            port,
            frames,
            accepted,
        }
    }

    fn local(port: u16) -> ClientConfig {
        ClientConfig {
            host: Some("127.0.0.1".into()),
            port: Some(port),
            secure: None,
        }
    }

    #[test]
    fn new_client_starts_connecting() {
        let client = RelayClient::new();
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert_eq!(client.pending_len(), 0);
    }

    #[test]
    fn sends_before_connect_are_queued() {
        let client = RelayClient::new();
        client.send("noteOn", json!({"note": 1, "velocity": 1}));
        client.send_note(NoteEvent::note_off(1).unwrap());
        assert_eq!(client.pending_len(), 2);
    }

    #[test]
    fn empty_event_name_is_not_sent() {
        let client = RelayClient::new();
        client.send("", json!(1));
        assert_eq!(client.pending_len(), 0);
    }

    #[tokio::test]
    async fn blank_host_aborts_without_state_change() {
        let client = RelayClient::new();
        client.send("noteOn", json!({"note": 1, "velocity": 1}));

        let config = ClientConfig {
            host: Some(String::new()),
            port: Some(9001),
            secure: None,
        };
        assert!(client.connect(&config).is_none());
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert_eq!(client.pending_len(), 1);
    }

    #[tokio::test]
    async fn close_before_connect_is_terminal() {
        let client = RelayClient::new();
        client.send("noteOn", json!({"note": 1, "velocity": 1}));

        client.close();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(client.pending_len(), 0);

        client.send("noteOn", json!({"note": 2, "velocity": 1}));
        assert_eq!(client.pending_len(), 0);
        assert!(client.connect(&local(1)).is_none());
    }

    #[tokio::test]
    async fn queued_sends_flush_in_order_once() {
        let mut server = test_server(None).await;
        let client = RelayClient::new();

        for note in 0..10u8 {
            client.send_note(NoteEvent::note_on(note, 100).unwrap());
        }
        let ready = client.connect(&local(server.port)).unwrap();
        ready.await.unwrap();

        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(client.pending_len(), 0);

        client.send_note(NoteEvent::note_off(0).unwrap());

        for note in 0..10u8 {
            let frame = server.frames.recv().await.unwrap();
            let env = Envelope::decode(&frame).unwrap();
            assert_eq!(env.event, "noteOn");
            assert_eq!(env.data["note"], note);
        }
        let last = Envelope::decode(&server.frames.recv().await.unwrap()).unwrap();
        assert_eq!(last.event, "noteOff");

        client.close();
        client.closed().await;
        assert!(server.frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn repeated_connect_opens_one_socket() {
        let server = test_server(None).await;
        let client = RelayClient::new();

        let ready = client.connect(&local(server.port)).unwrap();
        assert!(client.connect(&local(server.port)).is_none());
        ready.await.unwrap();

        for _ in 0..5 {
            assert!(client.connect(&local(server.port)).is_none());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_connect_keeps_queue_and_allows_retry() {
        // Grab a free port, then release it so nothing is listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = RelayClient::new();
        client.send("noteOn", json!({"note": 5, "velocity": 5}));

        let ready = client.connect(&local(port)).unwrap();
        assert!(ready.await.is_err());
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert_eq!(client.pending_len(), 1);

        let mut server = test_server(None).await;
        client.connect(&local(server.port)).unwrap().await.unwrap();
        let env = Envelope::decode(&server.frames.recv().await.unwrap()).unwrap();
        assert_eq!(env.data["note"], 5);
    }

    #[tokio::test]
    async fn inbound_events_reach_handlers() {
        let greeting = NoteEvent::note_on(40, 100).unwrap().to_envelope().encode().unwrap();
        let server = test_server(Some(greeting)).await;
        let client = RelayClient::new();
        let mut notes = client.subscribe_notes();

        client.connect(&local(server.port)).unwrap().await.unwrap();

        let note = tokio::time::timeout(Duration::from_secs(5), notes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(note, NoteEvent::note_on(40, 100).unwrap());
    }

    #[tokio::test]
    async fn malformed_inbound_frame_keeps_connection_open() {
        let server = test_server(Some("definitely not json".into())).await;
        let client = RelayClient::new();
        client.on("noteOn", |_| {});

        client.connect(&local(server.port)).unwrap().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(client.state(), ConnectionState::Open);
        assert!(client.router().has_handler("noteOn"));
    }

    #[tokio::test]
    async fn close_reaches_closed_and_drops_later_sends() {
        let server = test_server(None).await;
        let client = RelayClient::new();
        let mut states = client.watch_state();

        client.connect(&local(server.port)).unwrap().await.unwrap();
        client.close();
        client.closed().await;

        assert_eq!(*states.borrow_and_update(), ConnectionState::Closed);
        client.send("noteOn", json!({"note": 1, "velocity": 1}));
        assert_eq!(client.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tap_presses_then_releases() {
        let client = RelayClient::new();
        let key = KeyIndex::new(12).unwrap();
        let started = tokio::time::Instant::now();

        let tapping = tokio::spawn({
            let client = client.clone();
            async move { client.tap(key).await }
        });

        // Key is down, release still pending.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.pending_len(), 1);

        tapping.await.unwrap();
        assert!(started.elapsed() >= TAP_DURATION);

        let queued: Vec<NoteEvent> = client
            .endpoint
            .pending_packets()
            .iter()
            .map(|packet| NoteEvent::try_from(&Envelope::decode(packet).unwrap()).unwrap())
            .collect();
        assert_eq!(
            queued,
            vec![
                NoteEvent::NoteOn {
                    note: key,
                    velocity: 127
                },
                NoteEvent::NoteOff { note: key },
            ]
        );
    }
}
