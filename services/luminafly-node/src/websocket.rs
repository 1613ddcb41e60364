//! WebSocket observer feed
//!
//! Every client is subscribed to the engine's broadcaster and receives each
//! fleet event as a JSON text frame. Clients may send `status`, `start` or
//! `stop` to drive the engine; the reply is the engine status.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use luminafly_dispatch::{ControlLoop, EventBroadcaster};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// WebSocket server state
pub struct FeedServer {
    engine: Arc<ControlLoop>,
    addr: SocketAddr,
}

impl FeedServer {
    /// Create new feed server
    pub fn new(addr: SocketAddr, engine: Arc<ControlLoop>) -> Self {
        Self { engine, addr }
    }

    /// Accept clients until `shutdown` fires
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Observer feed listening");

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer_addr)) => {
                    debug!(%peer_addr, "New WebSocket connection");
                    let server = Arc::clone(&self);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, peer_addr, shutdown).await {
                            warn!(%peer_addr, error = %e, "WebSocket connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
        Ok(())
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let broadcaster = self.engine.broadcaster();
        let (subscription, mut feed) =
            broadcaster.subscribe_channel(EventBroadcaster::DEFAULT_CHANNEL_CAPACITY);
        info!(%peer_addr, %subscription, "Observer connected");

        let result = async {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    frame = feed.recv() => match frame {
                        Some(frame) => ws_sender.send(Message::Text(frame.to_string())).await?,
                        // Dropped by the broadcaster on engine stop
                        None => break,
                    },
                    msg = ws_receiver.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = self.command(text.trim()).await {
                                ws_sender.send(Message::Text(reply)).await?;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(%peer_addr, error = %e, "Error receiving from observer");
                            break;
                        }
                    },
                }
            }
            anyhow::Ok(())
        }
        .await;

        broadcaster.unsubscribe(subscription);
        if let Err(e) = ws_sender.close().await {
            debug!(%peer_addr, error = %e, "Close handshake failed");
        }
        info!(%peer_addr, %subscription, "Observer disconnected");
        result
    }

    async fn command(&self, command: &str) -> Option<String> {
        match command {
            "status" => {}
            "start" => {
                self.engine.start();
            }
            "stop" => {
                self.engine.stop().await;
            }
            other => {
                debug!(command = other, "Ignoring unknown observer command");
                return None;
            }
        }
        match serde_json::to_string(&self.engine.status()) {
            Ok(json) => Some(json),
            Err(e) => {
                error!(error = %e, "Failed to serialize engine status");
                None
            }
        }
    }
}
