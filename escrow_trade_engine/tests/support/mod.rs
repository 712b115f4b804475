#![allow(dead_code)]
use std::{sync::Arc, time::Duration};

use escrow_trade_engine::{
    db_types::{Address, AssetSpec, Role, Trade, TradeId},
    events::EventProducers,
    helpers::MessageBus,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        FakeLedger,
        FakeReleaseEndpoint,
    },
    trade_objects::TradeProposal,
    EscrowDatabase,
    MessageRelay,
    SqliteDatabase,
    TradeFlowApi,
    TradeFlowConfig,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const BUYER: &str = "0xb0b";
pub const SELLER: &str = "0x5e11e4";
pub const MALLORY: &str = "0xbad";
pub const ESCROW: &str = "0xe5c40";

pub type TestApi = TradeFlowApi<SqliteDatabase, FakeLedger, FakeReleaseEndpoint>;

pub struct TestSystem {
    pub url: String,
    pub db: SqliteDatabase,
    pub api: TestApi,
    pub relay: MessageRelay<SqliteDatabase>,
    pub ledger: FakeLedger,
    pub release: FakeReleaseEndpoint,
}

pub fn buyer() -> Address {
    Address::new(BUYER)
}

pub fn seller() -> Address {
    Address::new(SELLER)
}

pub fn mallory() -> Address {
    Address::new(MALLORY)
}

pub fn escrow() -> Address {
    Address::new(ESCROW)
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let url = random_db_path();
        let db = prepare_test_env(&url).await;
        let ledger = FakeLedger::new();
        let release = FakeReleaseEndpoint::new();
        let config = TradeFlowConfig {
            asset: AssetSpec::new("USDC", 6),
            escrow_address: escrow(),
            upstream_timeout: Duration::from_millis(250),
        };
        let api = TradeFlowApi::new(db.clone(), ledger.clone(), release.clone(), config, producers.clone());
        let relay = MessageRelay::new(db.clone(), Arc::new(MessageBus::default()), producers);
        api.register_seller(&seller()).await.expect("Error registering seller");
        Self { url, db, api, relay, ledger, release }
    }

    /// Buyer proposes `item` to the seller at `price`.
    pub async fn propose(&self, item: &str, price: &str) -> Trade {
        let proposal = TradeProposal {
            item_name: item.to_string(),
            description: format!("A fine {item}"),
            price: price.to_string(),
            counterparty: seller(),
            role: Role::Buyer,
        };
        self.api.propose(proposal, &buyer()).await.expect("Error proposing trade")
    }

    /// Proposes and accepts a trade, returning its id.
    pub async fn accepted_trade(&self, price: &str) -> TradeId {
        let trade = self.propose("Widget", price).await;
        self.api.accept(&trade.trade_id, &seller()).await.expect("Error accepting trade");
        trade.trade_id
    }

    /// A trade whose deposit has been confirmed by the ledger.
    pub async fn funded_trade(&self, price: &str, tx_ref: &str) -> TradeId {
        let id = self.accepted_trade(price).await;
        let amount = AssetSpec::new("USDC", 6).parse_decimal(price).expect("Bad price");
        self.ledger.add_transfer(tx_ref, amount, &escrow(), &buyer()).await;
        let result = self.api.submit_deposit(&id, &buyer(), tx_ref).await.expect("Error submitting deposit");
        assert!(result.advisory.is_none(), "Deposit was not confirmed: {:?}", result.advisory);
        id
    }

    pub async fn tear_down(self) {
        let mut db = self.db;
        if let Err(e) = db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Err(e) = Sqlite::drop_database(&self.url).await {
            warn!("🚀️ Could not remove test database {}: {e}", self.url);
        }
    }
}
