//! Per-connection handler: decode inbound frames and dispatch them.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use midirelay_common::{ConnectionId, EventRouter};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

/// Handle a single WebSocket connection until the peer leaves or the server
/// shuts down.
///
/// Malformed frames and unknown events are dropped without closing the
/// connection.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    router: EventRouter,
    mut shutdown: watch::Receiver<bool>,
) {
    let id = ConnectionId::new();
    let (mut sink, mut stream) = ws.split();
    let mut frames: u64 = 0;
    let mut dispatched: u64 = 0;

    tracing::info!(peer = %addr, conn = %id, "Client connected");

    loop {
        tokio::select! {
            // Server shutting down (or the server handle is gone).
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        frames += 1;
                        if router.deliver(&text) {
                            dispatched += 1;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        frames += 1;
                        if router.deliver_bytes(&bytes) {
                            dispatched += 1;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, conn = %id, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(
        peer = %addr,
        conn = %id,
        frames,
        dispatched,
        "Client disconnected"
    );
}
