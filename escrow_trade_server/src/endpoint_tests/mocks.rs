use escrow_trade_engine::ledger::{ReleaseEndpoint, ReleaseError, ReleaseReceipt, ReleaseRequest};
use mockall::mock;

mock! {
    pub Release {}
    impl ReleaseEndpoint for Release {
        async fn release(&self, request: &ReleaseRequest) -> Result<ReleaseReceipt, ReleaseError>;
    }
}
