use crate::db::traits::{ConversationManagement, SellerRegistry, StorageError, TradeManagement};

/// This trait defines the highest level of behaviour for backends supporting the escrow trade engine.
///
/// A backend must be cheap to clone (typically a handle to a connection pool), since every API instance and worker
/// holds its own copy.
#[allow(async_fn_in_trait)]
pub trait EscrowDatabase: Clone + TradeManagement + ConversationManagement + SellerRegistry {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
