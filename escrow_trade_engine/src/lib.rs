//! Escrow Trade Engine
//!
//! The escrow trade engine lets two parties who don't trust each other exchange goods for funds. The buyer pays into an
//! escrow-controlled address on a public ledger, and the funds are released to the seller only when the buyer hands
//! over a settlement artifact. Every trade comes with a conversation between the two parties.
//!
//! The library is divided into these sections:
//! 1. Database management and control ([`mod@db`]). SQLite is the supported backend. You should never need to access
//!    the database directly. Use the public API instead. The data types used in the database are defined in
//!    [`mod@db_types`] and are public.
//! 2. The public API ([`mod@api`]). [`TradeFlowApi`] drives the trade state machine, [`ConversationApi`] and
//!    [`MessageRelay`] handle conversations and messages, and [`AccessGuard`] decides who may see or do what.
//! 3. Adapters for the external ledger oracle and release endpoint ([`mod@ledger`]).
//!
//! The engine also emits events when a trade changes status or a message is sent. See [`mod@events`] for how to hook
//! into them.
mod db;

pub mod api;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod ledger;

#[cfg(feature = "test_utils")]
pub mod test_utils;

pub use api::{
    trade_objects,
    AccessGuard,
    AdvisoryError,
    ConversationApi,
    ConversationApiError,
    MessageRelay,
    TradeFlowApi,
    TradeFlowConfig,
    TradeFlowError,
};
#[cfg(feature = "sqlite")]
pub use db::sqlite::{db_url, SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{
    ConversationManagement,
    EscrowDatabase,
    InsertResult,
    SellerRegistry,
    StorageError,
    TradeManagement,
};
