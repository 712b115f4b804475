use crate::{
    db::traits::StorageError,
    db_types::{Address, Seller},
};

#[allow(async_fn_in_trait)]
pub trait SellerRegistry {
    /// Registers `address` as a seller. This call is idempotent; registering twice returns the original record.
    async fn register_seller(&self, address: &Address) -> Result<Seller, StorageError>;

    async fn fetch_seller(&self, address: &Address) -> Result<Option<Seller>, StorageError>;

    async fn is_registered_seller(&self, address: &Address) -> Result<bool, StorageError> {
        Ok(self.fetch_seller(address).await?.is_some())
    }
}
