use std::{sync::Arc, time::Duration};

use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use escrow_trade_engine::{
    db_types::{Address, AssetSpec},
    events::EventProducers,
    helpers::MessageBus,
    ledger::ReleaseEndpoint,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        FakeLedger,
        FakeReleaseEndpoint,
    },
    EscrowDatabase,
    MessageRelay,
    SqliteDatabase,
    TradeFlowApi,
    TradeFlowConfig,
};
use etg_common::Secret;
use log::*;

use crate::{
    auth::{CALLER_ADDRESS_HEADER, CALLER_HMAC_HEADER},
    config::CallerAuthConfig,
    helpers::calculate_hmac,
    routes::{
        health,
        AcceptTradeRoute,
        CancelTradeRoute,
        ConversationMessagesRoute,
        MarkMessageReadRoute,
        MyConversationsRoute,
        MyTradesRoute,
        OpenConversationRoute,
        ProposeTradeRoute,
        RegisterSellerRoute,
        RejectTradeRoute,
        SettleTradeRoute,
        SubmitDepositRoute,
        TradeByIdRoute,
        TradeHistoryRoute,
    },
};

pub const BUYER: &str = "0xb0b";
pub const SELLER: &str = "0x5e11e4";
pub const MALLORY: &str = "0xbad";
pub const ESCROW: &str = "0xe5c40";
const GATEWAY_SECRET: &str = "endpoint-test-secret";

pub struct TestContext<R = FakeReleaseEndpoint> {
    url: String,
    pub db: SqliteDatabase,
    pub api: web::Data<TradeFlowApi<SqliteDatabase, FakeLedger, R>>,
    pub relay: web::Data<MessageRelay<SqliteDatabase>>,
    pub ledger: FakeLedger,
}

impl TestContext<FakeReleaseEndpoint> {
    pub async fn new() -> Self {
        Self::with_release(FakeReleaseEndpoint::new()).await
    }
}

impl<R> TestContext<R>
where R: ReleaseEndpoint + 'static
{
    pub async fn with_release(release: R) -> Self {
        let url = random_db_path();
        let db = prepare_test_env(&url).await;
        let ledger = FakeLedger::new();
        let config = TradeFlowConfig {
            asset: AssetSpec::new("USDC", 6),
            escrow_address: Address::new(ESCROW),
            upstream_timeout: Duration::from_millis(250),
        };
        let api = TradeFlowApi::new(db.clone(), ledger.clone(), release, config, EventProducers::default());
        let relay = MessageRelay::new(db.clone(), Arc::new(MessageBus::default()), EventProducers::default());
        api.register_seller(&Address::new(SELLER)).await.expect("Error registering seller");
        Self { url, db, api: web::Data::new(api), relay: web::Data::new(relay), ledger }
    }

    /// Sends the request through an app wired like the real server, and returns the status and body.
    pub async fn send(&self, req: TestRequest) -> (StatusCode, String) {
        let app = App::new()
            .app_data(web::Data::new(auth_config()))
            .app_data(self.api.clone())
            .app_data(self.relay.clone())
            .service(health)
            .service(
                web::scope("/api")
                    .service(RegisterSellerRoute::<SqliteDatabase, FakeLedger, R>::new())
                    .service(ProposeTradeRoute::<SqliteDatabase, FakeLedger, R>::new())
                    .service(MyTradesRoute::<SqliteDatabase, FakeLedger, R>::new())
                    .service(TradeByIdRoute::<SqliteDatabase, FakeLedger, R>::new())
                    .service(TradeHistoryRoute::<SqliteDatabase, FakeLedger, R>::new())
                    .service(AcceptTradeRoute::<SqliteDatabase, FakeLedger, R>::new())
                    .service(SubmitDepositRoute::<SqliteDatabase, FakeLedger, R>::new())
                    .service(SettleTradeRoute::<SqliteDatabase, FakeLedger, R>::new())
                    .service(RejectTradeRoute::<SqliteDatabase, FakeLedger, R>::new())
                    .service(CancelTradeRoute::<SqliteDatabase, FakeLedger, R>::new())
                    .service(MyConversationsRoute::<SqliteDatabase>::new())
                    .service(OpenConversationRoute::<SqliteDatabase>::new())
                    .service(ConversationMessagesRoute::<SqliteDatabase>::new())
                    .service(MarkMessageReadRoute::<SqliteDatabase>::new()),
            );
        let service = test::init_service(app).await;
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let body = test::read_body(res).await;
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn tear_down(self) {
        let mut db = self.db;
        if let Err(e) = db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        let path = self.url.trim_start_matches("sqlite://");
        if let Err(e) = std::fs::remove_file(path) {
            warn!("🚀️ Could not remove test database {path}: {e}");
        }
    }
}

pub fn auth_config() -> CallerAuthConfig {
    CallerAuthConfig { hmac_secret: Secret::new(GATEWAY_SECRET.to_string()), hmac_checks: true }
}

/// Adds the headers the session gateway would set for `address`.
pub fn signed(req: TestRequest, address: &str) -> TestRequest {
    req.insert_header((CALLER_ADDRESS_HEADER, address))
        .insert_header((CALLER_HMAC_HEADER, calculate_hmac(GATEWAY_SECRET, address.as_bytes())))
}

pub fn get(path: &str, address: &str) -> TestRequest {
    signed(TestRequest::get().uri(path), address)
}

pub fn post<T: serde::Serialize>(path: &str, address: &str, body: &T) -> TestRequest {
    signed(TestRequest::post().uri(path).set_json(body), address)
}

pub fn post_empty(path: &str, address: &str) -> TestRequest {
    signed(TestRequest::post().uri(path), address)
}

pub fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"))
}
