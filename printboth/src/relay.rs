//! Messages exchanged with the relay and download collaborators.
//!
//! Two channels: commands go out through [`Relay::send`], captured locations
//! come back through a [`RelayListener`] obtained from [`Relay::listen`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::errors::PrintError;

/// Outgoing control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RelayCommand {
    /// Begin watching for newly opened documents and report their locations.
    #[serde(rename_all = "camelCase")]
    StartCapture { session_id: String },
    #[serde(rename_all = "camelCase")]
    StopCapture { session_id: String },
    /// Fetch and save the captured documents.
    DownloadDocuments { urls: Vec<String> },
}

/// Incoming notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RelayNotification {
    #[serde(alias = "capturedURL", rename_all = "camelCase")]
    CapturedLocation {
        url: String,
        /// Optional session tag. Untagged notifications are accepted by any session.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
}

#[async_trait]
pub trait Relay: Send + Sync {
    async fn send(&self, command: RelayCommand) -> Result<(), PrintError>;

    /// Register a listener for notifications. It stays registered until it is
    /// closed or dropped.
    fn listen(&self) -> RelayListener;
}

#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn download_documents(&self, urls: Vec<String>) -> Result<(), PrintError>;
}

type ListenerMap = HashMap<u64, mpsc::UnboundedSender<RelayNotification>>;

/// Fan-out of incoming notifications to the currently registered listeners.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Arc<Mutex<ListenerMap>>,
    next_id: Arc<AtomicU64>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ListenerMap> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self) -> RelayListener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        debug!(listener = id, "Relay listener registered");
        RelayListener {
            id,
            registry: Some(self.clone()),
            receiver: rx,
        }
    }

    /// Deliver to every listener; returns how many received it.
    pub fn dispatch(&self, notification: RelayNotification) -> usize {
        let listeners = self.lock();
        trace!(listeners = listeners.len(), ?notification, "Dispatching relay notification");
        listeners
            .values()
            .filter(|tx| tx.send(notification.clone()).is_ok())
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn deregister(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }
}

/// Receiving end of one registration. Deregisters exactly once: on the first
/// `close()` or on drop, whichever comes first.
pub struct RelayListener {
    id: u64,
    registry: Option<ListenerRegistry>,
    receiver: mpsc::UnboundedReceiver<RelayNotification>,
}

impl RelayListener {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next notification; `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<RelayNotification> {
        self.receiver.recv().await
    }

    pub fn is_registered(&self) -> bool {
        self.registry.is_some()
    }

    /// Returns `true` only for the call that actually deregistered.
    pub fn close(&mut self) -> bool {
        match self.registry.take() {
            Some(registry) => {
                registry.deregister(self.id);
                self.receiver.close();
                debug!(listener = self.id, "Relay listener deregistered");
                true
            }
            None => false,
        }
    }
}

impl Drop for RelayListener {
    fn drop(&mut self) {
        self.close();
    }
}

/// In-process relay: commands are forwarded to an mpsc receiver owned by the
/// embedder, notifications are injected with [`ChannelRelay::notify`].
#[derive(Clone)]
pub struct ChannelRelay {
    listeners: ListenerRegistry,
    commands: mpsc::UnboundedSender<RelayCommand>,
}

impl ChannelRelay {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RelayCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (
            Self {
                listeners: ListenerRegistry::new(),
                commands,
            },
            rx,
        )
    }

    /// Report an untagged captured location.
    pub fn notify(&self, url: impl Into<String>) -> usize {
        self.listeners.dispatch(RelayNotification::CapturedLocation {
            url: url.into(),
            session_id: None,
        })
    }

    /// Report a captured location tagged with a capture session.
    pub fn notify_for(&self, session_id: impl Into<String>, url: impl Into<String>) -> usize {
        self.listeners.dispatch(RelayNotification::CapturedLocation {
            url: url.into(),
            session_id: Some(session_id.into()),
        })
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl Relay for ChannelRelay {
    async fn send(&self, command: RelayCommand) -> Result<(), PrintError> {
        self.commands
            .send(command)
            .map_err(|_| PrintError::Relay("command receiver dropped".into()))
    }

    fn listen(&self) -> RelayListener {
        self.listeners.register()
    }
}

#[async_trait]
impl DownloadSink for ChannelRelay {
    async fn download_documents(&self, urls: Vec<String>) -> Result<(), PrintError> {
        self.send(RelayCommand::DownloadDocuments { urls }).await
    }
}
