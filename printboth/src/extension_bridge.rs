use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex, OnceCell},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

use crate::errors::PrintError;
use crate::relay::{DownloadSink, ListenerRegistry, Relay, RelayCommand, RelayListener, RelayNotification};

const DEFAULT_WS_ADDR: &str = "127.0.0.1:17374";

type Clients = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum BridgeIncoming {
    Notification(RelayNotification),
    Typed(TypedIncoming),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum TypedIncoming {
    #[serde(rename = "hello")]
    Hello { from: Option<String> },
    #[serde(rename = "pong")]
    Pong,
}

/// WebSocket endpoint the browser extension's background context connects to.
///
/// Commands are broadcast to every connected client; `capturedLocation`
/// notifications from any client are fanned out to the registered listeners.
pub struct RelayBridge {
    server_task: JoinHandle<()>,
    addr: SocketAddr,
    clients: Clients,
    listeners: ListenerRegistry,
}

static GLOBAL: OnceCell<Arc<RelayBridge>> = OnceCell::const_new();

impl RelayBridge {
    /// Process-wide bridge on the default address.
    pub async fn global() -> Result<Arc<RelayBridge>, PrintError> {
        // Concurrent first callers wait on the same bind instead of racing for the port.
        GLOBAL
            .get_or_try_init(|| async { RelayBridge::bind(DEFAULT_WS_ADDR).await.map(Arc::new) })
            .await
            .cloned()
    }

    pub async fn bind(addr: &str) -> Result<RelayBridge, PrintError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PrintError::Relay(format!("failed to bind {addr}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| PrintError::Relay(format!("local addr: {e}")))?;
        tracing::info!("Relay bridge listening on {}", addr);

        let clients: Clients = Arc::new(Mutex::new(HashMap::new()));
        let listeners = ListenerRegistry::new();
        let clients_clone = clients.clone();
        let listeners_clone = listeners.clone();

        let server_task = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("ws accept error: {}", e);
                        continue;
                    }
                };
                let ws_clients = clients_clone.clone();
                let ws_listeners = listeners_clone.clone();
                tokio::spawn(async move {
                    let ws_stream = match accept_async(stream).await {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(%peer, "ws handshake error: {}", e);
                            return;
                        }
                    };
                    let (mut sink, mut stream) = ws_stream.split();
                    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

                    // writer task
                    let writer = tokio::spawn(async move {
                        while let Some(msg) = rx.recv().await {
                            if let Err(e) = sink.send(msg).await {
                                tracing::warn!("ws send error: {}", e);
                                break;
                            }
                        }
                    });

                    let client_id = Uuid::new_v4().to_string();
                    ws_clients.lock().await.insert(client_id.clone(), tx);
                    tracing::debug!(client = %client_id, %peer, "Relay client registered");

                    // reader loop
                    while let Some(Ok(msg)) = stream.next().await {
                        if !msg.is_text() {
                            continue;
                        }
                        let txt = msg.into_text().unwrap_or_default();
                        match serde_json::from_str::<BridgeIncoming>(&txt) {
                            Ok(BridgeIncoming::Notification(notification)) => {
                                let delivered = ws_listeners.dispatch(notification);
                                if delivered == 0 {
                                    tracing::debug!(client = %client_id, "Captured location with no active capture session");
                                }
                            }
                            Ok(BridgeIncoming::Typed(TypedIncoming::Hello { from })) => {
                                tracing::info!(client = %client_id, from = ?from, "Extension connected");
                            }
                            Ok(BridgeIncoming::Typed(TypedIncoming::Pong)) => {}
                            Err(e) => {
                                let head: String = txt.chars().take(200).collect();
                                tracing::warn!(raw = %head, "Invalid incoming JSON: {}", e);
                            }
                        }
                    }

                    ws_clients.lock().await.remove(&client_id);
                    tracing::info!(client = %client_id, "Relay client disconnected");
                    writer.abort();
                });
            }
        });

        Ok(RelayBridge {
            server_task,
            addr,
            clients,
            listeners,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn is_client_connected(&self) -> bool {
        !self.clients.lock().await.is_empty()
    }

    async fn broadcast(&self, command: &RelayCommand) -> Result<(), PrintError> {
        let payload = serde_json::to_string(command)
            .map_err(|e| PrintError::Relay(format!("bridge serialize: {e}")))?;
        let clients = self.clients.lock().await;
        if clients.is_empty() {
            return Err(PrintError::Relay("no relay client connected".into()));
        }
        tracing::debug!(clients = clients.len(), payload = %payload, "Sending command to relay");
        let delivered = clients
            .values()
            .filter(|tx| tx.send(Message::Text(payload.clone())).is_ok())
            .count();
        if delivered == 0 {
            return Err(PrintError::Relay("failed to send to any relay client".into()));
        }
        Ok(())
    }
}

impl Drop for RelayBridge {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}

#[async_trait]
impl Relay for RelayBridge {
    async fn send(&self, command: RelayCommand) -> Result<(), PrintError> {
        self.broadcast(&command).await
    }

    fn listen(&self) -> RelayListener {
        self.listeners.register()
    }
}

#[async_trait]
impl DownloadSink for RelayBridge {
    async fn download_documents(&self, urls: Vec<String>) -> Result<(), PrintError> {
        self.broadcast(&RelayCommand::DownloadDocuments { urls }).await
    }
}
