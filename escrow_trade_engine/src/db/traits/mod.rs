//! #  Database management and control.
//!
//! This module defines the interface contracts that database *backends* of the escrow trade engine must satisfy.
//!
//! * [`EscrowDatabase`] is the highest level of behaviour. A backend that implements it can host the whole engine.
//! * [`TradeManagement`] stores trades, applies compare-and-set status updates and keeps the audit trail.
//! * [`ConversationManagement`] stores conversations and their append-only message logs.
//! * [`SellerRegistry`] records which addresses are registered sellers.
//!
//! Backends never make lifecycle decisions. Guards and transition rules live in the API layer
//! ([`crate::TradeFlowApi`]); the backend's job is to apply an update atomically or report that the trade moved on.
mod conversation_management;
mod escrow_database;
mod seller_registry;
mod trade_management;

pub use conversation_management::ConversationManagement;
pub use escrow_database::EscrowDatabase;
pub use seller_registry::SellerRegistry;
use thiserror::Error;
pub use trade_management::TradeManagement;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("The record was modified concurrently: {0}")]
    StaleUpdate(String),
    #[error("Duplicate record: {0}")]
    Duplicate(String),
}

/// The result of an idempotent insert. `true` if a new record was created, `false` if it already existed.
pub type InsertResult<T> = (T, bool);
