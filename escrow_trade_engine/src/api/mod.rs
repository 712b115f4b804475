//! The public face of the escrow trade engine.
//!
//! * [`TradeFlowApi`] drives trades through their lifecycle and talks to the ledger oracle and release endpoint.
//! * [`ConversationApi`] creates and lists conversations.
//! * [`MessageRelay`] stores messages and pushes them to live subscribers.
//! * [`AccessGuard`] decides who may read or drive what.
mod access_guard;
mod conversation_api;
mod errors;
mod message_relay;
mod trade_flow_api;
pub mod trade_objects;

pub use access_guard::AccessGuard;
pub use conversation_api::ConversationApi;
pub use errors::{AdvisoryError, ConversationApiError, TradeFlowError};
pub use message_relay::{MessageRelay, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_MESSAGE_BYTES, MAX_HISTORY_LIMIT};
pub use trade_flow_api::{TradeFlowApi, TradeFlowConfig, DEFAULT_UPSTREAM_TIMEOUT};
