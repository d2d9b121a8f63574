use tracing::debug;
use uuid::Uuid;

use murmur_types::events::GatewayEvent;
use murmur_types::Message;

use crate::timeline::Timeline;

/// Identifies one history request. Only the most recent ticket is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    chat_id: Uuid,
    seq: u64,
}

impl FetchTicket {
    pub fn chat_id(&self) -> Uuid {
        self.chat_id
    }
}

/// Local state of one connected client.
///
/// The user's identity comes from the gateway's `Ready` event, once per
/// connection. At most one chat is open at a time and at most one history
/// fetch is outstanding for it; starting a new fetch makes the previous one
/// stale so its results are dropped.
#[derive(Debug)]
pub struct ClientSession {
    user_id: Uuid,
    username: String,
    timeline: Option<Timeline>,
    pending_fetch: Option<FetchTicket>,
    next_seq: u64,
}

impl ClientSession {
    pub fn new(user_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            timeline: None,
            pending_fetch: None,
            next_seq: 0,
        }
    }

    /// Build a session from the gateway's `Ready` event.
    pub fn from_ready(event: &GatewayEvent) -> Option<Self> {
        match event {
            GatewayEvent::Ready { user_id, username } => Some(Self::new(*user_id, username.clone())),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Switch to a chat. Re-opening the current chat keeps what is loaded.
    pub fn open_chat(&mut self, chat_id: Uuid) {
        if self.current_chat() == Some(chat_id) {
            return;
        }
        self.timeline = Some(Timeline::new(chat_id));
        self.pending_fetch = None;
    }

    pub fn close_chat(&mut self) {
        self.timeline = None;
        self.pending_fetch = None;
    }

    pub fn current_chat(&self) -> Option<Uuid> {
        self.timeline.as_ref().map(Timeline::chat_id)
    }

    /// Start a history fetch for the open chat, superseding any outstanding one.
    pub fn begin_history_fetch(&mut self) -> Option<FetchTicket> {
        let chat_id = self.current_chat()?;
        self.next_seq += 1;
        let ticket = FetchTicket {
            chat_id,
            seq: self.next_seq,
        };
        self.pending_fetch = Some(ticket);
        Some(ticket)
    }

    pub fn has_pending_fetch(&self) -> bool {
        self.pending_fetch.is_some()
    }

    /// Merge the result of a fetch. Returns the number of new messages, or
    /// `None` if the ticket is stale and the result was discarded.
    pub fn complete_history_fetch(&mut self, ticket: FetchTicket, messages: Vec<Message>) -> Option<usize> {
        if self.pending_fetch != Some(ticket) {
            debug!("Discarding stale history for chat {}", ticket.chat_id);
            return None;
        }
        self.pending_fetch = None;
        let timeline = self.timeline.as_mut()?;
        Some(timeline.merge_history(messages))
    }

    pub fn abandon_history_fetch(&mut self, ticket: FetchTicket) {
        if self.pending_fetch == Some(ticket) {
            self.pending_fetch = None;
        }
    }

    /// Apply a gateway event. Returns the message if it was new to the open chat.
    pub fn apply_event(&mut self, event: &GatewayEvent) -> Option<&Message> {
        if event.chat_id() != self.current_chat() {
            return None;
        }
        let GatewayEvent::ReceiveMessage(message) = event else {
            return None;
        };
        let timeline = self.timeline.as_mut()?;
        if !timeline.push_live(message.clone()) {
            return None;
        }
        timeline.get(&message.timeline_key())
    }

    pub fn timeline(&self) -> Option<&Timeline> {
        self.timeline.as_ref()
    }

    /// Messages of the open chat in render order.
    pub fn messages(&self) -> Vec<Message> {
        self.timeline
            .as_ref()
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }
}
