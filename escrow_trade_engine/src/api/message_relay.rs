use std::{fmt::Debug, sync::Arc};

use chrono::Utc;
use log::*;
use tokio::sync::broadcast;

use crate::{
    api::{AccessGuard, ConversationApi, ConversationApiError},
    db::traits::ConversationManagement,
    db_types::{Address, ConversationId, HistoryOrder, Message, MessageBody, NewConversation, NewMessage},
    events::{EventProducers, MessageSentEvent},
    helpers::{message_preview, KeyedLocks, MessageBus},
};

pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4096;
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 200;

/// Persists messages and pushes them to live subscribers.
///
/// For any one conversation, storing a message and publishing it happen under the same lock, so live subscribers
/// receive messages in exactly the order they were stored. A message is never published before it is stored.
pub struct MessageRelay<B> {
    db: B,
    conversations: ConversationApi<B>,
    bus: Arc<MessageBus>,
    locks: Arc<KeyedLocks<ConversationId>>,
    max_message_bytes: usize,
    producers: EventProducers,
}

impl<B: Clone> Clone for MessageRelay<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            conversations: self.conversations.clone(),
            bus: Arc::clone(&self.bus),
            locks: Arc::clone(&self.locks),
            max_message_bytes: self.max_message_bytes,
            producers: self.producers.clone(),
        }
    }
}

impl<B> Debug for MessageRelay<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageRelay (max {} bytes)", self.max_message_bytes)
    }
}

impl<B: Clone> MessageRelay<B> {
    pub fn new(db: B, bus: Arc<MessageBus>, producers: EventProducers) -> Self {
        let conversations = ConversationApi::new(db.clone());
        Self {
            db,
            conversations,
            bus,
            locks: Arc::new(KeyedLocks::new()),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            producers,
        }
    }

    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }
}

impl<B> MessageRelay<B>
where B: ConversationManagement
{
    /// Stores a message from `sender` to `recipient` and publishes it on the conversation's topic.
    ///
    /// An address-pair conversation is created by its first message, provided the id is the one derived from the
    /// sender and recipient. Any other unknown conversation id is rejected.
    pub async fn send(
        &self,
        id: &ConversationId,
        sender: &Address,
        recipient: &Address,
        body: MessageBody,
    ) -> Result<Message, ConversationApiError> {
        if body.is_empty() {
            return Err(ConversationApiError::ValidationError("Message body cannot be empty".into()));
        }
        if body.len() > self.max_message_bytes {
            return Err(ConversationApiError::ValidationError(format!(
                "Message is {} bytes. The maximum is {}",
                body.len(),
                self.max_message_bytes
            )));
        }
        sender.validate()?;
        recipient.validate()?;
        if sender == recipient {
            return Err(ConversationApiError::ValidationError("You cannot send a message to yourself".into()));
        }
        let _guard = self.locks.lock(id).await;
        let conversation = match self.db.fetch_conversation(id).await? {
            Some(c) => c,
            None if id == &ConversationApi::<B>::conversation_id_for(sender, recipient) => {
                let new_conversation = NewConversation::new(id.clone(), sender.clone(), recipient.clone());
                let (c, _) = self.db.get_or_create_conversation(new_conversation).await?;
                info!("💬️ Conversation {id} opened by its first message");
                c
            },
            None => return Err(ConversationApiError::NotFound(format!("Conversation {id}"))),
        };
        if !AccessGuard::can_access_conversation(&conversation, sender) {
            return Err(ConversationApiError::Forbidden(format!("You are not a participant in conversation {id}")));
        }
        if conversation.counterparty_of(sender) != Some(recipient) {
            return Err(ConversationApiError::ValidationError(format!(
                "{recipient} is not the other participant in conversation {id}"
            )));
        }
        let preview = message_preview(&body);
        let message = NewMessage::new(id.clone(), sender.clone(), recipient.clone(), body);
        let message = self.db.insert_message(message, &preview).await?;
        let reached = self.bus.publish(message.clone()).await;
        debug!("💬️ Message #{} in {id} delivered live to {reached} sessions", message.id);
        self.producers.publish_message_sent(MessageSentEvent::new(message.clone())).await;
        Ok(message)
    }

    /// A page of the conversation's messages. `limit` defaults to 50 and is capped at 200.
    pub async fn history(
        &self,
        id: &ConversationId,
        caller: &Address,
        limit: Option<i64>,
        offset: Option<i64>,
        order: HistoryOrder,
    ) -> Result<Vec<Message>, ConversationApiError> {
        if self.conversations.authorize(id, caller).await?.is_none() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        let offset = offset.unwrap_or(0).max(0);
        let messages = self.db.fetch_messages(id, limit, offset, order).await?;
        Ok(messages)
    }

    /// Marks the message as read. Only the recipient can do this, and only once. Returns whether anything changed.
    pub async fn mark_read(&self, message_id: i64, caller: &Address) -> Result<bool, ConversationApiError> {
        let message = self
            .db
            .fetch_message(message_id)
            .await?
            .ok_or_else(|| ConversationApiError::NotFound(format!("Message #{message_id}")))?;
        if &message.recipient_address != caller {
            trace!("💬️ {caller} is not the recipient of message #{message_id}. Ignoring read receipt.");
            return Ok(false);
        }
        let updated = self.db.mark_message_read(message_id, caller, Utc::now()).await?;
        Ok(updated)
    }

    /// A live feed of new messages in the conversation, for callers allowed to read it.
    pub async fn subscribe(
        &self,
        id: &ConversationId,
        caller: &Address,
    ) -> Result<broadcast::Receiver<Message>, ConversationApiError> {
        self.conversations.authorize(id, caller).await?;
        Ok(self.bus.subscribe(id).await)
    }

    pub fn conversations(&self) -> &ConversationApi<B> {
        &self.conversations
    }
}
