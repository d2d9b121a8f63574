use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use murmur_types::Message;

/// One chat's messages, deduplicated by id and kept in render order
/// (timestamp, then id text).
///
/// History pages and live pushes may arrive in any order; whichever copy of
/// a message lands first is kept and later copies are ignored.
#[derive(Debug, Clone)]
pub struct Timeline {
    chat_id: Uuid,
    seen: HashSet<Uuid>,
    ordered: BTreeMap<(DateTime<Utc>, String), Message>,
}

impl Timeline {
    pub fn new(chat_id: Uuid) -> Self {
        Self {
            chat_id,
            seen: HashSet::new(),
            ordered: BTreeMap::new(),
        }
    }

    pub fn chat_id(&self) -> Uuid {
        self.chat_id
    }

    /// Merge a fetched history page. Returns how many messages were new.
    pub fn merge_history<I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        messages
            .into_iter()
            .filter(|m| self.insert(m.clone()))
            .count()
    }

    /// Apply a live push. Returns false for duplicates and other chats.
    pub fn push_live(&mut self, message: Message) -> bool {
        self.insert(message)
    }

    fn insert(&mut self, message: Message) -> bool {
        if message.chat_id != self.chat_id || !self.seen.insert(message.id) {
            return false;
        }
        self.ordered.insert(message.timeline_key(), message);
        true
    }

    /// Look a message up by its render-order key.
    pub fn get(&self, key: &(DateTime<Utc>, String)) -> Option<&Message> {
        self.ordered.get(key)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.ordered.values()
    }

    /// Oldest message held, used as the cursor for fetching older pages.
    pub fn oldest(&self) -> Option<&Message> {
        self.ordered.values().next()
    }

    pub fn latest(&self) -> Option<&Message> {
        self.ordered.values().next_back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(chat_id: Uuid, at: DateTime<Utc>, body: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            chat_id,
            sender_id: Uuid::new_v4(),
            body: body.into(),
            created_at: at,
        }
    }

    #[test]
    fn live_then_history_keeps_one_copy() {
        let chat = Uuid::new_v4();
        let now = Utc::now();
        let m1 = message(chat, now, "one");
        let m2 = message(chat, now + Duration::seconds(1), "two");

        let mut timeline = Timeline::new(chat);
        assert!(timeline.push_live(m2.clone()));
        assert_eq!(timeline.merge_history(vec![m1.clone(), m2.clone()]), 1);

        let bodies: Vec<&str> = timeline.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["one", "two"]);
    }

    #[test]
    fn history_then_live_keeps_one_copy() {
        let chat = Uuid::new_v4();
        let m1 = message(chat, Utc::now(), "one");

        let mut timeline = Timeline::new(chat);
        assert_eq!(timeline.merge_history(vec![m1.clone()]), 1);
        assert!(!timeline.push_live(m1.clone()));
        assert_eq!(timeline.merge_history(vec![m1.clone()]), 0);
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn first_copy_wins() {
        let chat = Uuid::new_v4();
        let live = message(chat, Utc::now(), "live copy");
        let mut fetched = live.clone();
        fetched.body = "fetched copy".into();

        let mut timeline = Timeline::new(chat);
        timeline.push_live(live);
        timeline.merge_history(vec![fetched]);
        assert_eq!(timeline.latest().map(|m| m.body.as_str()), Some("live copy"));
    }

    #[test]
    fn equal_timestamps_order_by_id_text() {
        let chat = Uuid::new_v4();
        let at = Utc::now();
        let mut a = message(chat, at, "a");
        let mut b = message(chat, at, "b");
        a.id = Uuid::parse_str("00000000-0000-4000-8000-00000000000a").unwrap();
        b.id = Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap();

        let mut timeline = Timeline::new(chat);
        timeline.push_live(a);
        timeline.push_live(b);

        let bodies: Vec<&str> = timeline.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["b", "a"]);
    }

    #[test]
    fn other_chats_are_ignored() {
        let chat = Uuid::new_v4();
        let mut timeline = Timeline::new(chat);
        assert!(!timeline.push_live(message(Uuid::new_v4(), Utc::now(), "elsewhere")));
        assert!(timeline.is_empty());
    }

    #[test]
    fn out_of_order_arrivals_render_chronologically() {
        let chat = Uuid::new_v4();
        let now = Utc::now();
        let msgs: Vec<Message> = (0..5)
            .map(|i| message(chat, now + Duration::milliseconds(i), &i.to_string()))
            .collect();

        let mut timeline = Timeline::new(chat);
        timeline.push_live(msgs[4].clone());
        timeline.push_live(msgs[2].clone());
        timeline.merge_history(vec![msgs[0].clone(), msgs[1].clone(), msgs[2].clone()]);
        timeline.push_live(msgs[3].clone());

        let ids: Vec<Uuid> = timeline.iter().map(|m| m.id).collect();
        let expected: Vec<Uuid> = msgs.iter().map(|m| m.id).collect();
        assert_eq!(ids, expected);
        assert_eq!(timeline.oldest().map(|m| m.id), Some(msgs[0].id));
    }
}
