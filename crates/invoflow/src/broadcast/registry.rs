//! Live client connections that receive mirror events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::mirror::MirrorEvent;

struct Connection {
    token: u64,
    folder_filter: Option<String>,
    sender: mpsc::UnboundedSender<MirrorEvent>,
}

impl Connection {
    fn wants(&self, event: &MirrorEvent) -> bool {
        self.folder_filter
            .as_deref()
            .map_or(true, |folder| event.is_for_folder(folder))
    }
}

#[derive(Default)]
struct Inner {
    connections: Mutex<HashMap<String, Connection>>,
    next_token: AtomicU64,
}

/// Explicit registry of connected clients.
///
/// Registering hands out a [`ConnectionHandle`]; dropping it unregisters the
/// client. Registering an existing client id replaces the old connection.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client, optionally only for events of one folder.
    pub fn register(&self, client_id: &str, folder_filter: Option<&str>) -> ConnectionHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let connection = Connection {
            token,
            folder_filter: folder_filter.map(str::to_string),
            sender,
        };

        if let Ok(mut connections) = self.inner.connections.lock() {
            if connections.insert(client_id.to_string(), connection).is_some() {
                tracing::debug!(client_id, "Replaced existing connection");
            }
        }

        ConnectionHandle {
            client_id: client_id.to_string(),
            token,
            receiver,
            registry: self.clone(),
        }
    }

    /// Removes a client. Returns whether it was registered.
    pub fn remove(&self, client_id: &str) -> bool {
        self.inner
            .connections
            .lock()
            .map(|mut connections| connections.remove(client_id).is_some())
            .unwrap_or(false)
    }

    fn remove_if_current(&self, client_id: &str, token: u64) {
        if let Ok(mut connections) = self.inner.connections.lock() {
            if connections.get(client_id).is_some_and(|c| c.token == token) {
                connections.remove(client_id);
            }
        }
    }

    /// Delivers an event to every interested client and returns how many
    /// received it. Clients whose receiver is gone are dropped.
    pub fn broadcast(&self, event: &MirrorEvent) -> usize {
        let Ok(mut connections) = self.inner.connections.lock() else {
            return 0;
        };
        let mut delivered = 0;
        connections.retain(|_, connection| {
            if !connection.wants(event) {
                return true;
            }
            match connection.sender.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    pub fn len(&self) -> usize {
        self.inner
            .connections
            .lock()
            .map(|connections| connections.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forwards mirror events to the registry until the mirror is dropped.
    pub fn spawn_pump(&self, mut events: broadcast::Receiver<MirrorEvent>) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        registry.broadcast(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Mirror pump lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// A registered client's end of the connection.
pub struct ConnectionHandle {
    client_id: String,
    token: u64,
    receiver: mpsc::UnboundedReceiver<MirrorEvent>,
    registry: ConnectionRegistry,
}

impl ConnectionHandle {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn recv(&mut self) -> Option<MirrorEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MirrorEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.registry.remove_if_current(&self.client_id, self.token);
    }
}
