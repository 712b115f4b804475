use chrono::{DateTime, Utc};

use crate::{
    db::traits::{InsertResult, StorageError},
    db_types::{Address, Conversation, ConversationId, HistoryOrder, Message, NewConversation, NewMessage},
};

/// Storage contract for conversations and their messages.
///
/// Messages are append-only. The only mutation a message ever sees is the single `read_at` write.
#[allow(async_fn_in_trait)]
pub trait ConversationManagement {
    /// Fetches the conversation with the given id, creating it with the supplied participants if it does not exist.
    /// An existing conversation is returned unchanged.
    async fn get_or_create_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<InsertResult<Conversation>, StorageError>;

    async fn fetch_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, StorageError>;

    /// Conversations in which `address` participates, most recently active first.
    async fn fetch_conversations_for_address(&self, address: &Address) -> Result<Vec<Conversation>, StorageError>;

    /// Updates the denormalised last-message fields of a conversation.
    async fn touch_conversation(
        &self,
        id: &ConversationId,
        at: DateTime<Utc>,
        preview: &str,
    ) -> Result<(), StorageError>;

    /// Persists a message and touches its conversation with `preview` in one transaction.
    async fn insert_message(&self, message: NewMessage, preview: &str) -> Result<Message, StorageError>;

    async fn fetch_message(&self, id: i64) -> Result<Option<Message>, StorageError>;

    async fn fetch_messages(
        &self,
        id: &ConversationId,
        limit: i64,
        offset: i64,
        order: HistoryOrder,
    ) -> Result<Vec<Message>, StorageError>;

    /// Sets `read_at` on the message if `recipient` is its recipient and it has not been read yet.
    ///
    /// Returns `true` if the message was updated.
    async fn mark_message_read(&self, id: i64, recipient: &Address, at: DateTime<Utc>) -> Result<bool, StorageError>;
}
