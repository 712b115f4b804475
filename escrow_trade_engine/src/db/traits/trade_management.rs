use crate::{
    db::traits::StorageError,
    db_types::{Address, NewTrade, NewTradeEvent, Trade, TradeEvent, TradeId, TradeStatusType, TradeUpdate},
};

/// The `TradeManagement` trait defines how trades are stored and mutated in the database backend.
#[allow(async_fn_in_trait)]
pub trait TradeManagement {
    /// Stores a brand-new trade in `Pending` status, together with the creation entry in the audit trail and the
    /// trade's bound conversation (`trade_<tradeId>`), in a single atomic transaction. Either all three are stored or
    /// none of them is.
    ///
    /// If a trade with the same id already exists, [`StorageError::Duplicate`] is returned.
    async fn insert_trade(&self, trade: NewTrade, actor: &Address) -> Result<Trade, StorageError>;

    async fn fetch_trade(&self, trade_id: &TradeId) -> Result<Option<Trade>, StorageError>;

    /// All trades in which `address` is the buyer or the seller, newest first.
    async fn fetch_trades_for_address(&self, address: &Address) -> Result<Vec<Trade>, StorageError>;

    /// All trades currently in the given status, oldest first.
    async fn fetch_trades_with_status(&self, status: TradeStatusType) -> Result<Vec<Trade>, StorageError>;

    /// The trade whose current deposit reference is `tx_ref`, if any.
    async fn fetch_trade_by_deposit_ref(&self, tx_ref: &str) -> Result<Option<Trade>, StorageError>;

    /// Applies `update` to the trade if, and only if, its status is still `update.expected_status`. The audit `event`
    /// is written in the same transaction.
    ///
    /// The timestamp column for the new status is set when the status changes. `deposit_submitted_at` is refreshed
    /// whenever a deposit reference is written.
    ///
    /// Returns the updated trade, or [`StorageError::StaleUpdate`] if the trade is no longer in the expected status.
    async fn update_trade(
        &self,
        trade_id: &TradeId,
        update: TradeUpdate,
        event: NewTradeEvent,
    ) -> Result<Trade, StorageError>;

    /// Appends an entry to the audit trail without touching the trade itself.
    async fn record_trade_event(&self, event: NewTradeEvent) -> Result<TradeEvent, StorageError>;

    /// The audit trail for a trade, in the order the events happened.
    async fn fetch_trade_events(&self, trade_id: &TradeId) -> Result<Vec<TradeEvent>, StorageError>;
}
