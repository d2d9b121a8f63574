use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use murmur_types::events::GatewayEvent;

/// Why a single delivery to a session was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The session's outbound queue is full (slow reader).
    Full,
    /// The session is gone.
    Closed,
}

/// Cheap, cloneable handle to one live connection's outbound queue.
/// Two handles are equal when they refer to the same session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    user_id: Uuid,
    tx: mpsc::Sender<GatewayEvent>,
}

impl SessionHandle {
    /// Create a session with an outbound queue holding at most `capacity` events.
    pub fn new(user_id: Uuid, capacity: usize) -> (Self, mpsc::Receiver<GatewayEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            user_id,
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Queue an event without waiting. Never blocks on a slow reader.
    pub fn deliver(&self, event: GatewayEvent) -> Result<(), DeliveryFailure> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionHandle {}

/// Tracks which live sessions are in which chat room.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RwLock<Rooms>>,
}

#[derive(Default)]
struct Rooms {
    /// chat_id -> (session_id -> handle)
    by_chat: HashMap<Uuid, HashMap<Uuid, SessionHandle>>,

    /// session_id -> joined chat_ids, so disconnect does not scan every room
    by_session: HashMap<Uuid, HashSet<Uuid>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a room. Returns false if it was already a member.
    pub async fn add(&self, chat_id: Uuid, handle: &SessionHandle) -> bool {
        let mut rooms = self.inner.write().await;

        let room = rooms.by_chat.entry(chat_id).or_default();
        if room.contains_key(&handle.id) {
            return false;
        }
        room.insert(handle.id, handle.clone());

        rooms.by_session.entry(handle.id).or_default().insert(chat_id);
        true
    }

    /// Remove a session from one room. Returns false if it was not a member.
    pub async fn remove(&self, chat_id: Uuid, session_id: Uuid) -> bool {
        let mut rooms = self.inner.write().await;

        let removed = match rooms.by_chat.get_mut(&chat_id) {
            Some(room) => {
                let removed = room.remove(&session_id).is_some();
                if room.is_empty() {
                    rooms.by_chat.remove(&chat_id);
                }
                removed
            }
            None => false,
        };

        if let Some(chats) = rooms.by_session.get_mut(&session_id) {
            chats.remove(&chat_id);
            if chats.is_empty() {
                rooms.by_session.remove(&session_id);
            }
        }

        removed
    }

    /// Remove a session from every room in one step. Safe to call repeatedly
    /// or for a session that never joined anything. Returns the rooms it left.
    pub async fn remove_all(&self, session_id: Uuid) -> Vec<Uuid> {
        let mut rooms = self.inner.write().await;

        let Some(chats) = rooms.by_session.remove(&session_id) else {
            return Vec::new();
        };

        for chat_id in &chats {
            if let Some(room) = rooms.by_chat.get_mut(chat_id) {
                room.remove(&session_id);
                if room.is_empty() {
                    rooms.by_chat.remove(chat_id);
                }
            }
        }

        chats.into_iter().collect()
    }

    /// Snapshot of a room's members. Later joins and leaves do not affect it.
    pub async fn members(&self, chat_id: Uuid) -> Vec<SessionHandle> {
        self.inner
            .read()
            .await
            .by_chat
            .get(&chat_id)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.by_chat.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (SessionHandle, mpsc::Receiver<GatewayEvent>) {
        SessionHandle::new(Uuid::new_v4(), 8)
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let registry = RoomRegistry::new();
        let chat = Uuid::new_v4();
        let (s1, _rx) = session();

        assert!(registry.add(chat, &s1).await);
        assert!(!registry.add(chat, &s1).await);
        assert_eq!(registry.members(chat).await, vec![s1]);
    }

    #[tokio::test]
    async fn snapshot_survives_later_changes() {
        let registry = RoomRegistry::new();
        let chat = Uuid::new_v4();
        let (s1, _rx1) = session();
        let (s2, _rx2) = session();
        registry.add(chat, &s1).await;
        registry.add(chat, &s2).await;

        let snapshot = registry.members(chat).await;
        registry.remove(chat, s1.id()).await;
        let (s3, _rx3) = session();
        registry.add(chat, &s3).await;

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&s1));

        let now = registry.members(chat).await;
        assert_eq!(now.len(), 2);
        assert!(!now.contains(&s1));
        assert!(now.contains(&s3));
    }

    #[tokio::test]
    async fn remove_all_clears_every_room() {
        let registry = RoomRegistry::new();
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
        let (s1, _rx1) = session();
        let (s2, _rx2) = session();
        registry.add(c1, &s1).await;
        registry.add(c2, &s1).await;
        registry.add(c2, &s2).await;

        let mut left = registry.remove_all(s1.id()).await;
        left.sort();
        let mut expected = vec![c1, c2];
        expected.sort();
        assert_eq!(left, expected);

        assert!(registry.members(c1).await.is_empty());
        assert_eq!(registry.members(c2).await, vec![s2.clone()]);
        assert_eq!(registry.room_count().await, 1);

        // idempotent, and fine for unknown sessions
        assert!(registry.remove_all(s1.id()).await.is_empty());
        assert!(registry.remove_all(Uuid::new_v4()).await.is_empty());
    }

    #[tokio::test]
    async fn remove_of_non_member_is_noop() {
        let registry = RoomRegistry::new();
        let chat = Uuid::new_v4();
        let (s1, _rx1) = session();

        assert!(!registry.remove(chat, s1.id()).await);
        registry.add(chat, &s1).await;
        assert!(registry.remove(chat, s1.id()).await);
        assert!(registry.remove_all(s1.id()).await.is_empty());
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_and_leaves_stay_consistent() {
        let registry = RoomRegistry::new();
        let chat = Uuid::new_v4();

        let mut tasks = Vec::new();
        for i in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (s, rx) = SessionHandle::new(Uuid::new_v4(), 1);
                registry.add(chat, &s).await;
                if i % 2 == 0 {
                    registry.remove_all(s.id()).await;
                }
                (s, rx)
            }));
        }

        let mut kept = Vec::new();
        for task in tasks {
            kept.push(task.await.unwrap());
        }

        let members = registry.members(chat).await;
        assert_eq!(members.len(), 32);
        for (i, (s, _)) in kept.iter().enumerate() {
            assert_eq!(members.contains(s), i % 2 == 1);
        }
    }

    #[test]
    fn deliver_reports_full_and_closed_queues() {
        let (s, mut rx) = SessionHandle::new(Uuid::new_v4(), 1);
        let event = GatewayEvent::Ready {
            user_id: s.user_id(),
            username: "ada".into(),
        };

        assert_eq!(s.deliver(event.clone()), Ok(()));
        assert_eq!(s.deliver(event.clone()), Err(DeliveryFailure::Full));
        assert!(rx.try_recv().is_ok());

        drop(rx);
        assert_eq!(s.deliver(event), Err(DeliveryFailure::Closed));
    }
}
