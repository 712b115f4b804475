use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    api::{AccessGuard, ConversationApiError},
    db::traits::ConversationManagement,
    db_types::{Address, Conversation, ConversationId, NewConversation},
    helpers::truncate_preview,
};

/// Creates and looks up conversations.
///
/// A conversation is either bound to a trade (`trade_<tradeId>`) or keyed by the pair of addresses taking part in it.
/// Participants are fixed when the conversation is first created and never change afterwards.
#[derive(Clone)]
pub struct ConversationApi<B> {
    db: B,
}

impl<B> Debug for ConversationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConversationApi")
    }
}

impl<B> ConversationApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// The deterministic id for the direct conversation between `a` and `b`.
    pub fn conversation_id_for(a: &Address, b: &Address) -> ConversationId {
        ConversationId::for_pair(a.as_str(), b.as_str())
    }
}

impl<B> ConversationApi<B>
where B: ConversationManagement
{
    /// Fetches the conversation, creating it with the given participants if it doesn't exist yet.
    pub async fn get_or_create(
        &self,
        id: ConversationId,
        buyer: &Address,
        seller: &Address,
    ) -> Result<Conversation, ConversationApiError> {
        buyer.validate()?;
        seller.validate()?;
        if buyer == seller {
            return Err(ConversationApiError::ValidationError("A conversation needs two different participants".into()));
        }
        let new_conversation = NewConversation::new(id, buyer.clone(), seller.clone());
        let (conversation, created) = self.db.get_or_create_conversation(new_conversation).await?;
        if created {
            info!("💬️ Conversation {} opened between {buyer} and {seller}", conversation.conversation_id);
        }
        Ok(conversation)
    }

    /// Records activity on a conversation that has no stored message behind it, moving the conversation to the top of
    /// its participants' lists with `preview` as the description. The preview is cut to the usual length.
    ///
    /// [`MessageRelay::send`](crate::MessageRelay::send) does not go through here. It touches the conversation inside
    /// the transaction that stores the message.
    pub async fn touch(&self, id: &ConversationId, preview: &str) -> Result<(), ConversationApiError> {
        self.db.touch_conversation(id, Utc::now(), &truncate_preview(preview)).await?;
        trace!("💬️ Conversation {id} touched");
        Ok(())
    }

    /// Opens (or re-opens) the direct conversation between the caller and `counterparty`. The caller is labelled as the
    /// buyer. No seller registration is needed for direct contact.
    pub async fn open_direct(
        &self,
        caller: &Address,
        counterparty: &Address,
    ) -> Result<Conversation, ConversationApiError> {
        let id = Self::conversation_id_for(caller, counterparty);
        let conversation = self.get_or_create(id, caller, counterparty).await?;
        if !AccessGuard::can_access_conversation(&conversation, caller) {
            return Err(ConversationApiError::Forbidden(format!(
                "You are not a participant in conversation {}",
                conversation.conversation_id
            )));
        }
        Ok(conversation)
    }

    pub async fn conversations_for(&self, caller: &Address) -> Result<Vec<Conversation>, ConversationApiError> {
        let conversations = self.db.fetch_conversations_for_address(caller).await?;
        trace!("💬️ {caller} has {} conversations", conversations.len());
        Ok(conversations)
    }

    /// Access-checked fetch of a single conversation.
    pub async fn conversation(
        &self,
        id: &ConversationId,
        caller: &Address,
    ) -> Result<Conversation, ConversationApiError> {
        let conversation = self
            .db
            .fetch_conversation(id)
            .await?
            .ok_or_else(|| ConversationApiError::NotFound(format!("Conversation {id}")))?;
        if !AccessGuard::can_access_conversation(&conversation, caller) {
            return Err(ConversationApiError::Forbidden(format!("You are not a participant in conversation {id}")));
        }
        Ok(conversation)
    }

    /// Checks that the caller may read `id`.
    ///
    /// An address-pair conversation that has not been created yet is readable (and empty) for either of its two
    /// addresses, so that a live session can join before the first message is sent. Returns the stored conversation,
    /// if there is one.
    pub async fn authorize(
        &self,
        id: &ConversationId,
        caller: &Address,
    ) -> Result<Option<Conversation>, ConversationApiError> {
        match self.db.fetch_conversation(id).await? {
            Some(conversation) => {
                if AccessGuard::can_access_conversation(&conversation, caller) {
                    Ok(Some(conversation))
                } else {
                    Err(ConversationApiError::Forbidden(format!("You are not a participant in conversation {id}")))
                }
            },
            None => match id.pair_members() {
                Some((a, b)) if &a == caller || &b == caller => Ok(None),
                Some(_) => {
                    warn!("🛂️ {caller} was denied access to conversation {id}");
                    Err(ConversationApiError::Forbidden(format!("You are not a participant in conversation {id}")))
                },
                None => Err(ConversationApiError::NotFound(format!("Conversation {id}"))),
            },
        }
    }
}
