use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use murmur_db::MessageStore;
use murmur_types::events::GatewayEvent;
use murmur_types::{ChatError, Message};

use crate::registry::{DeliveryFailure, RoomRegistry, SessionHandle};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// The single path through which chat messages are persisted and delivered.
///
/// A message is written to the store first; only once the write has committed
/// is it pushed to the sessions in the chat's room (the sender's own session
/// included). Recipients that are slow or gone lose that one live delivery and
/// pick the message up on their next history fetch.
#[derive(Clone)]
pub struct MessageRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    store: Arc<dyn MessageStore>,
    rooms: RoomRegistry,
    send_timeout: Duration,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn MessageStore>, send_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                store,
                rooms: RoomRegistry::new(),
                send_timeout,
            }),
        }
    }

    pub fn store(&self) -> Arc<dyn MessageStore> {
        self.inner.store.clone()
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.inner.rooms
    }

    /// Subscribe a session to a chat's live messages. Joining twice is a no-op.
    pub async fn join(&self, session: &SessionHandle, chat_id: Uuid) -> bool {
        let added = self.inner.rooms.add(chat_id, session).await;
        if added {
            info!("Session {} ({}) joined chat {}", session.id(), session.user_id(), chat_id);
        }
        added
    }

    pub async fn leave(&self, session: &SessionHandle, chat_id: Uuid) -> bool {
        let removed = self.inner.rooms.remove(chat_id, session.id()).await;
        if removed {
            info!("Session {} ({}) left chat {}", session.id(), session.user_id(), chat_id);
        }
        removed
    }

    /// Drop a session from every room it joined.
    pub async fn disconnect(&self, session: &SessionHandle) {
        let left = self.inner.rooms.remove_all(session.id()).await;
        debug!(
            "Session {} removed from {} rooms, {} rooms still active",
            session.id(),
            left.len(),
            self.inner.rooms.room_count().await
        );
    }

    /// Persist a message, then deliver it to everyone currently in the room.
    ///
    /// Errors are for the caller alone: nothing is delivered unless the store
    /// accepted the message.
    pub async fn send(&self, chat_id: Uuid, sender_id: Uuid, body: &str) -> Result<Message, ChatError> {
        if body.trim().is_empty() {
            return Err(ChatError::Validation("message body is empty".into()));
        }

        let message = self.persist(chat_id, sender_id, body.to_string()).await?;
        let delivered = self.fan_out(&message).await;

        debug!(
            "Message {} in chat {} delivered to {} sessions",
            message.id, chat_id, delivered
        );
        Ok(message)
    }

    async fn persist(&self, chat_id: Uuid, sender_id: Uuid, body: String) -> Result<Message, ChatError> {
        let store = self.inner.store.clone();
        let write = tokio::task::spawn_blocking(move || store.create_message(chat_id, sender_id, &body));

        match tokio::time::timeout(self.inner.send_timeout, write).await {
            Ok(Ok(Ok(message))) => Ok(message),
            Ok(Ok(Err(e))) => {
                let err = ChatError::from(e);
                if matches!(err, ChatError::Persistence(_)) {
                    error!("Failed to store message in chat {}: {}", chat_id, err);
                }
                Err(err)
            }
            Ok(Err(join_err)) => {
                error!("spawn_blocking join error: {}", join_err);
                Err(ChatError::Persistence("store task failed".into()))
            }
            Err(_) => {
                error!(
                    "Storing message in chat {} timed out after {:?}",
                    chat_id, self.inner.send_timeout
                );
                Err(ChatError::Persistence(format!(
                    "store did not respond within {:?}; the message may still be saved, \
                     check history before resending",
                    self.inner.send_timeout
                )))
            }
        }
    }

    /// Push a stored message to a snapshot of the room. Each recipient is its
    /// own failure domain; returns how many sessions accepted it.
    async fn fan_out(&self, message: &Message) -> usize {
        let recipients = self.inner.rooms.members(message.chat_id).await;
        let event = GatewayEvent::ReceiveMessage(message.clone());

        let mut delivered = 0;
        for session in recipients {
            match session.deliver(event.clone()) {
                Ok(()) => delivered += 1,
                Err(DeliveryFailure::Full) => warn!(
                    "Session {} ({}) is not keeping up, dropped live message {}",
                    session.id(),
                    session.user_id(),
                    message.id
                ),
                Err(DeliveryFailure::Closed) => debug!(
                    "Session {} went away before message {} arrived",
                    session.id(),
                    message.id
                ),
            }
        }
        delivered
    }
}
