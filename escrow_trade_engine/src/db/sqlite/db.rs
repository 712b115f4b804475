use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{conversations, db_url, messages, new_pool, sellers, trades, SqliteDatabaseError};
use crate::{
    db::traits::{
        ConversationManagement,
        EscrowDatabase,
        InsertResult,
        SellerRegistry,
        StorageError,
        TradeManagement,
    },
    db_types::{
        Address,
        Conversation,
        ConversationId,
        HistoryOrder,
        Message,
        NewConversation,
        NewMessage,
        NewTrade,
        NewTradeEvent,
        Seller,
        Trade,
        TradeEvent,
        TradeId,
        TradeStatusType,
        TradeUpdate,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `ETG_DATABASE_URL`, or the default location.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn run_migrations(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl EscrowDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

impl TradeManagement for SqliteDatabase {
    async fn insert_trade(&self, trade: NewTrade, actor: &Address) -> Result<Trade, StorageError> {
        let mut tx = self.pool.begin().await?;
        let trade = trades::insert_trade(trade, &mut tx).await?;
        let event = NewTradeEvent::new(trade.trade_id.clone(), None, TradeStatusType::Pending, actor.clone());
        trades::insert_event(event, &mut tx).await?;
        let conversation =
            NewConversation::new(trade.conversation_id(), trade.buyer_address.clone(), trade.seller_address.clone());
        conversations::idempotent_insert(conversation, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Trade {} and its conversation have been saved in the DB", trade.trade_id);
        Ok(trade)
    }

    async fn fetch_trade(&self, trade_id: &TradeId) -> Result<Option<Trade>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trades::fetch_trade(trade_id, &mut conn).await?)
    }

    async fn fetch_trades_for_address(&self, address: &Address) -> Result<Vec<Trade>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trades::fetch_trades_for_address(address, &mut conn).await?)
    }

    async fn fetch_trades_with_status(&self, status: TradeStatusType) -> Result<Vec<Trade>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trades::fetch_trades_with_status(status, &mut conn).await?)
    }

    async fn fetch_trade_by_deposit_ref(&self, tx_ref: &str) -> Result<Option<Trade>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trades::fetch_trade_by_deposit_ref(tx_ref, &mut conn).await?)
    }

    async fn update_trade(
        &self,
        trade_id: &TradeId,
        update: TradeUpdate,
        event: NewTradeEvent,
    ) -> Result<Trade, StorageError> {
        let expected = update.expected_status;
        let mut tx = self.pool.begin().await?;
        let Some(trade) = trades::update_trade(trade_id, update, &mut tx).await? else {
            let current = trades::fetch_trade(trade_id, &mut tx).await?;
            tx.rollback().await?;
            return match current {
                None => Err(StorageError::NotFound(format!("Trade {trade_id}"))),
                Some(t) => Err(StorageError::StaleUpdate(format!(
                    "Trade {trade_id} is {} but {expected} was expected",
                    t.status
                ))),
            };
        };
        trades::insert_event(event, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Trade {trade_id} updated. Status is now {}", trade.status);
        Ok(trade)
    }

    async fn record_trade_event(&self, event: NewTradeEvent) -> Result<TradeEvent, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trades::insert_event(event, &mut conn).await?)
    }

    async fn fetch_trade_events(&self, trade_id: &TradeId) -> Result<Vec<TradeEvent>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(trades::fetch_events(trade_id, &mut conn).await?)
    }
}

impl SellerRegistry for SqliteDatabase {
    async fn register_seller(&self, address: &Address) -> Result<Seller, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(sellers::idempotent_insert(address, &mut conn).await?)
    }

    async fn fetch_seller(&self, address: &Address) -> Result<Option<Seller>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(sellers::fetch_seller(address, &mut conn).await?)
    }
}

impl ConversationManagement for SqliteDatabase {
    async fn get_or_create_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<InsertResult<Conversation>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let (conversation, created) = conversations::idempotent_insert(conversation, &mut conn).await?;
        if created {
            debug!("🗃️ Conversation {} created", conversation.conversation_id);
        }
        Ok((conversation, created))
    }

    async fn fetch_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(conversations::fetch_conversation(id, &mut conn).await?)
    }

    async fn fetch_conversations_for_address(&self, address: &Address) -> Result<Vec<Conversation>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(conversations::fetch_conversations_for_address(address, &mut conn).await?)
    }

    async fn touch_conversation(
        &self,
        id: &ConversationId,
        at: DateTime<Utc>,
        preview: &str,
    ) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(conversations::touch_conversation(id, at, preview, &mut conn).await?)
    }

    async fn insert_message(&self, message: NewMessage, preview: &str) -> Result<Message, StorageError> {
        let mut tx = self.pool.begin().await?;
        let message = messages::insert_message(message, &mut tx).await?;
        conversations::touch_conversation(&message.conversation_id, message.created_at, preview, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Message #{} stored in {}", message.id, message.conversation_id);
        Ok(message)
    }

    async fn fetch_message(&self, id: i64) -> Result<Option<Message>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(messages::fetch_message(id, &mut conn).await?)
    }

    async fn fetch_messages(
        &self,
        id: &ConversationId,
        limit: i64,
        offset: i64,
        order: HistoryOrder,
    ) -> Result<Vec<Message>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(messages::fetch_messages(id, limit, offset, order, &mut conn).await?)
    }

    async fn mark_message_read(&self, id: i64, recipient: &Address, at: DateTime<Utc>) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(messages::mark_read(id, recipient, at, &mut conn).await?)
    }
}
