use std::collections::HashMap;

use log::*;
use tokio::sync::{broadcast, RwLock};

use crate::db_types::{ConversationId, Message};

/// Capacity of each conversation's broadcast buffer. A subscriber that falls further behind than this receives a
/// `Lagged` error and should re-read history from storage.
pub const DEFAULT_TOPIC_CAPACITY: usize = 64;

/// In-process fan-out of persisted messages, one topic per conversation.
///
/// Only messages that are already committed to storage are published, so a live subscriber never sees anything that a
/// later history read would not also return.
pub struct MessageBus {
    capacity: usize,
    topics: RwLock<HashMap<ConversationId, broadcast::Sender<Message>>>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), topics: RwLock::new(HashMap::new()) }
    }

    pub async fn subscribe(&self, id: &ConversationId) -> broadcast::Receiver<Message> {
        if let Some(tx) = self.topics.read().await.get(id) {
            return tx.subscribe();
        }
        let mut topics = self.topics.write().await;
        let tx = topics.entry(id.clone()).or_insert_with(|| broadcast::channel(self.capacity).0);
        trace!("💬️ New live subscriber on {id}");
        tx.subscribe()
    }

    /// Sends the message to every live subscriber of its conversation. Returns the number of subscribers reached.
    pub async fn publish(&self, message: Message) -> usize {
        let id = message.conversation_id.clone();
        let reached = match self.topics.read().await.get(&id) {
            Some(tx) => tx.send(message).unwrap_or(0),
            None => 0,
        };
        if reached == 0 {
            let mut topics = self.topics.write().await;
            if topics.get(&id).is_some_and(|tx| tx.receiver_count() == 0) {
                topics.remove(&id);
                trace!("💬️ Dropped idle topic {id}");
            }
        }
        reached
    }

    pub async fn subscriber_count(&self, id: &ConversationId) -> usize {
        self.topics.read().await.get(id).map(|tx| tx.receiver_count()).unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::Address;

    fn message(id: i64, conversation: &str) -> Message {
        Message {
            id,
            conversation_id: ConversationId::from(conversation),
            sender_address: Address::new("alice"),
            recipient_address: Address::new("bob"),
            plain_text: format!("message {id}"),
            is_encrypted: false,
            encrypted_payload: None,
            encryption_metadata: None,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    #[tokio::test]
    async fn subscribers_only_see_their_topic() {
        let bus = MessageBus::default();
        let mut rx_a = bus.subscribe(&"trade_a".into()).await;
        let mut rx_b = bus.subscribe(&"trade_b".into()).await;
        assert_eq!(bus.publish(message(1, "trade_a")).await, 1);
        assert_eq!(rx_a.recv().await.unwrap().id, 1);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn order_is_preserved() {
        let bus = MessageBus::default();
        let mut rx = bus.subscribe(&"c".into()).await;
        for i in 1..=5 {
            bus.publish(message(i, "c")).await;
        }
        for i in 1..=5 {
            assert_eq!(rx.recv().await.unwrap().id, i);
        }
    }

    #[tokio::test]
    async fn slow_subscribers_lag() {
        let bus = MessageBus::new(2);
        let mut rx = bus.subscribe(&"c".into()).await;
        for i in 1..=4 {
            bus.publish(message(i, "c")).await;
        }
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(2))));
        assert_eq!(rx.recv().await.unwrap().id, 3);
    }

    #[tokio::test]
    async fn idle_topics_are_dropped() {
        let bus = MessageBus::default();
        let rx = bus.subscribe(&"c".into()).await;
        drop(rx);
        assert_eq!(bus.publish(message(1, "c")).await, 0);
        assert_eq!(bus.subscriber_count(&"c".into()).await, 0);
        assert!(bus.topics.read().await.is_empty());
    }
}
