//! Routing for one-to-one chat sockets.
//!
//! Every message is written twice: under the sender's leg (already read) and
//! under the receiver's leg (unread until the receiver is looking at it).

use crate::db::ChatRepository;
use crate::error::AppResult;
use crate::models::{ChatMessage, InboundMessage};
use crate::websocket::{ChatLeg, ConnectionRegistry, SessionHandle, SessionId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Close code a client sends when it hangs up on purpose.
pub const CLEAN_CLOSE_CODE: u16 = 69;
const NORMAL_CLOSE: u16 = 1000;
const GOING_AWAY: u16 = 1001;

#[derive(Clone)]
pub struct MessageRouter {
    chat: Arc<dyn ChatRepository>,
    registry: ConnectionRegistry,
}

/// What happened to an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Delivered {
        /// Whether the receiver's leg was live.
        receiver_online: bool,
    },
    /// Payload did not decode; nothing stored.
    Dropped,
}

impl MessageRouter {
    pub fn new(chat: Arc<dyn ChatRepository>, registry: ConnectionRegistry) -> Self {
        Self { chat, registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Open the viewer's leg: mark its mailbox row read, register the socket
    /// and push the leg's full history as one frame.
    pub async fn connect(&self, leg: &ChatLeg, handle: SessionHandle) -> AppResult<()> {
        let forward = leg.forward();

        self.chat.mark_read(&leg.viewer, &leg.counterpart).await?;
        self.registry.register(&forward, handle.clone()).await;

        let history = self.chat.history(&forward).await?;
        debug!(leg = %forward, messages = history.len(), "chat leg opened");
        handle.deliver(&history);
        Ok(())
    }

    pub async fn on_message(&self, leg: &ChatLeg, raw: &str) -> AppResult<Routed> {
        let inbound = match serde_json::from_str::<InboundMessage>(raw) {
            Ok(inbound) => inbound,
            Err(e) => {
                debug!(leg = %leg.forward(), error = %e, "dropping malformed chat payload");
                return Ok(Routed::Dropped);
            }
        };

        let forward = leg.forward();
        let mirror = leg.mirror();

        let own_copy =
            ChatMessage::stamped(forward.clone(), &leg.viewer, &leg.counterpart, &inbound.message);
        self.chat.append(&own_copy).await?;
        self.chat
            .upsert_mailbox(&leg.viewer, &[leg.counterpart.clone()], &inbound.message, true)
            .await?;
        if let Some(handle) = self.registry.lookup(&forward).await {
            handle.deliver(std::slice::from_ref(&own_copy));
        }

        let their_copy =
            ChatMessage::stamped(mirror.clone(), &leg.viewer, &leg.counterpart, &inbound.message);
        self.chat.append(&their_copy).await?;
        self.chat
            .upsert_mailbox(&leg.counterpart, &[leg.viewer.clone()], &inbound.message, false)
            .await?;

        let receiver_online = match self.registry.lookup(&mirror).await {
            Some(handle) => {
                self.chat.mark_read(&leg.counterpart, &leg.viewer).await?;
                handle.deliver(std::slice::from_ref(&their_copy))
            }
            None => false,
        };

        Ok(Routed::Delivered { receiver_online })
    }

    /// Drop the viewer's leg if it still belongs to `session`.
    pub async fn close(&self, leg: &ChatLeg, session: SessionId, code: Option<u16>) {
        let forward = leg.forward();
        self.registry.release_handle(&forward, session).await;

        match code {
            Some(CLEAN_CLOSE_CODE) => info!(leg = %forward, "chat leg closed by client"),
            Some(NORMAL_CLOSE) | Some(GOING_AWAY) | None => {
                debug!(leg = %forward, "chat socket disconnected")
            }
            Some(other) => warn!(leg = %forward, code = other, "chat socket closed with protocol error"),
        }
    }
}
