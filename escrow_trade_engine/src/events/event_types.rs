use serde::{Deserialize, Serialize};

use crate::db_types::{Address, Message, Trade, TradeStatusType};

/// Emitted after a trade status change has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeStatusChangedEvent {
    pub trade: Trade,
    /// `None` when the trade was just created
    pub old_status: Option<TradeStatusType>,
    pub actor: Address,
}

impl TradeStatusChangedEvent {
    pub fn new(trade: Trade, old_status: Option<TradeStatusType>, actor: Address) -> Self {
        Self { trade, old_status, actor }
    }

    pub fn new_status(&self) -> TradeStatusType {
        self.trade.status
    }
}

/// Emitted after a message has been persisted, before it is fanned out to live subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSentEvent {
    pub message: Message,
}

impl MessageSentEvent {
    pub fn new(message: Message) -> Self {
        Self { message }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    TradeStatusChanged(TradeStatusChangedEvent),
    MessageSent(MessageSentEvent),
}
