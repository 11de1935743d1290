use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

use crate::models::ChatMessage;

pub mod leg;

pub use leg::{is_participant_id, ChatLeg};

/// Unique identifier for one chat socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Write half of a live chat socket.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    sender: UnboundedSender<String>,
}

impl SessionHandle {
    /// New handle plus the receiver the socket drains.
    pub fn channel() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                id: SessionId::new(),
                sender: tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue `messages` as one JSON array frame. False once the socket is gone.
    pub fn deliver(&self, messages: &[ChatMessage]) -> bool {
        match serde_json::to_string(messages) {
            Ok(frame) => self.sender.send(frame).is_ok(),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode chat frame");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Live sockets keyed by chat leg.
///
/// At most one handle per leg; registering again replaces the previous
/// handle without closing it.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, key: &str, handle: SessionHandle) {
        let mut guard = self.inner.write().await;
        if let Some(previous) = guard.insert(key.to_string(), handle) {
            tracing::debug!(leg = %key, displaced = ?previous.id(), "chat leg re-registered");
        }
    }

    pub async fn lookup(&self, key: &str) -> Option<SessionHandle> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn release(&self, key: &str) {
        self.inner.write().await.remove(key);
    }

    /// Remove `key` only while it still points at `session`.
    pub async fn release_handle(&self, key: &str, session: SessionId) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get(key) {
            Some(current) if current.id() == session => {
                guard.remove(key);
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
