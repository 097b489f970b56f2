//! Session manager: accept connections and bridge them into one router.
//!
//! No per-connection registry is kept. Each accepted socket gets its own task
//! that decodes frames and dispatches them; tasks only share the router.

use std::net::SocketAddr;

use midirelay_common::{EventRouter, Result};
use midirelay_config::ServerConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;

/// A bound relay listener. Nothing is accepted until [`run`](Self::run) or
/// [`spawn`](Self::spawn).
pub struct RelayServer {
    listener: TcpListener,
    router: EventRouter,
}

impl RelayServer {
    /// Bind `addr` (e.g. `"0.0.0.0:8080"`, or port `0` for an ephemeral port).
    pub async fn bind(addr: &str, router: EventRouter) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, router })
    }

    pub async fn from_config(config: &ServerConfig, router: EventRouter) -> Result<Self> {
        Self::bind(&config.bind_addr(), router).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Accept connections until `shutdown` flips to `true` or its sender is
    /// dropped, then close every open connection and wait for them.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let router = self.router.clone();
                        let conn_shutdown = shutdown.clone();
                        connections.spawn(async move {
                            match accept_async(stream).await {
                                Ok(ws) => handle_connection(ws, addr, router, conn_shutdown).await,
                                Err(e) => {
                                    tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "TCP accept error");
                    }
                },

                // Reap finished connection tasks.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        tracing::info!(open = connections.len(), "Relay shutting down");
        while connections.join_next().await.is_some() {}
    }

    /// Run the accept loop on a background task.
    pub fn spawn(self) -> Result<ServerHandle> {
        let addr = self.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        Ok(ServerHandle {
            addr,
            shutdown_tx,
            task,
        })
    }
}

/// Handle to a spawned [`RelayServer`].
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, close every connection, and wait for the server task.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Relay task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    async fn spawn_server(router: EventRouter) -> ServerHandle {
        RelayServer::bind("127.0.0.1:0", router)
            .await
            .unwrap()
            .spawn()
            .unwrap()
    }

    fn text(frame: &str) -> Message {
        Message::Text(frame.to_string().into())
    }

    fn url(handle: &ServerHandle) -> String {
        format!("ws://{}", handle.local_addr())
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for dispatch")
            .expect("router channel closed")
    }

    #[tokio::test]
    async fn bind_reports_ephemeral_port() {
        let server = RelayServer::bind("127.0.0.1:0", EventRouter::new())
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn bind_conflict_is_an_io_error() {
        let first = RelayServer::bind("127.0.0.1:0", EventRouter::new())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap().to_string();
        let second = RelayServer::bind(&addr, EventRouter::new()).await;
        assert!(matches!(second, Err(midirelay_common::RelayError::Io(_))));
    }

    #[tokio::test]
    async fn text_frames_are_dispatched() {
        let router = EventRouter::new();
        let mut rx = router.subscribe("noteOn");
        let handle = spawn_server(router).await;

        let (mut ws, _) = connect_async(url(&handle)).await.unwrap();
        ws.send(text(r#"{"event":"noteOn","data":{"note":40,"velocity":100}}"#))
            .await
            .unwrap();

        assert_eq!(recv(&mut rx).await, json!({"note": 40, "velocity": 100}));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn binary_frames_are_dispatched() {
        let router = EventRouter::new();
        let mut rx = router.subscribe("noteOff");
        let handle = spawn_server(router).await;

        let (mut ws, _) = connect_async(url(&handle)).await.unwrap();
        let frame = br#"{"event":"noteOff","data":{"note":3,"velocity":0}}"#.to_vec();
        ws.send(Message::Binary(frame.into())).await.unwrap();

        assert_eq!(recv(&mut rx).await["note"], 3);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_frames_do_not_close_the_connection() {
        let router = EventRouter::new();
        let mut rx = router.subscribe("noteOn");
        let handle = spawn_server(router.clone()).await;

        let (mut ws, _) = connect_async(url(&handle)).await.unwrap();
        let malformed = [
            "not json",
            r#"{"data":1}"#,
            r#"{"event":"","data":1}"#,
            r#"{"event":"unknown"}"#,
        ];
        for bad in malformed {
            ws.send(text(bad)).await.unwrap();
        }
        ws.send(text(r#"{"event":"noteOn","data":{"note":1,"velocity":1}}"#))
            .await
            .unwrap();

        assert_eq!(recv(&mut rx).await["note"], 1);
        assert_eq!(router.len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn per_connection_order_is_preserved() {
        let router = EventRouter::new();
        let mut rx = router.subscribe("noteOn");
        let handle = spawn_server(router).await;

        let (mut ws, _) = connect_async(url(&handle)).await.unwrap();
        for note in 0..20 {
            let frame = json!({"event": "noteOn", "data": {"note": note, "velocity": 1}});
            ws.send(text(&frame.to_string())).await.unwrap();
        }

        for note in 0..20 {
            assert_eq!(recv(&mut rx).await["note"], note);
        }
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn many_producers_share_one_router() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        router.on("noteOn", move |data| {
            sink.lock().unwrap().push(data);
            let _ = done_tx.send(());
        });
        let handle = spawn_server(router).await;

        let mut peers = Vec::new();
        for producer in 0..3 {
            let (mut ws, _) = connect_async(url(&handle)).await.unwrap();
            let frame = json!({"event": "noteOn", "data": {"note": producer, "velocity": 64}});
            ws.send(text(&frame.to_string())).await.unwrap();
            peers.push(ws);
        }

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
                .await
                .unwrap()
                .unwrap();
        }
        let mut notes: Vec<i64> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|d| d["note"].as_i64().unwrap())
            .collect();
        notes.sort();
        assert_eq!(notes, vec![0, 1, 2]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_open_connections() {
        let handle = spawn_server(EventRouter::new()).await;
        let (mut ws, _) = connect_async(url(&handle)).await.unwrap();

        handle.shutdown().await;

        let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap();
        assert!(matches!(next, Some(Ok(Message::Close(_))) | None | Some(Err(_))));
    }

    #[tokio::test]
    async fn ping_is_answered() {
        let handle = spawn_server(EventRouter::new()).await;
        let (mut ws, _) = connect_async(url(&handle)).await.unwrap();

        ws.send(Message::Ping(vec![1, 2, 3].into())).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(reply, Message::Pong(ref data) if data.to_vec() == vec![1u8, 2, 3]));
        handle.shutdown().await;
    }
}
