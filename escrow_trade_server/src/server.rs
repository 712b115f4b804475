use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use escrow_trade_engine::{
    events::{EventHandlers, EventHooks, EventProducers, MessageSentEvent, TradeStatusChangedEvent},
    helpers::MessageBus,
    ledger::{HttpLedgerOracle, HttpReleaseEndpoint},
    MessageRelay,
    SqliteDatabase,
    TradeFlowApi,
};
use log::*;

use crate::{
    config::ServerConfig,
    deposit_worker::{start_deposit_worker, ServerTradeApi},
    errors::ServerError,
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
    ws::ChatSocketRoute,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let hooks = create_event_hooks();
    let handlers = EventHandlers::new(128, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let api = create_trade_api(&config, db.clone(), producers.clone())?;
    let _worker = start_deposit_worker(api.clone(), config.deposit_poll_interval);
    let relay = MessageRelay::new(db, Arc::new(MessageBus::default()), producers)
        .with_max_message_bytes(config.max_message_bytes);
    let srv = create_server_instance(config, api, relay)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_trade_api(
    config: &ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<ServerTradeApi, ServerError> {
    let oracle = HttpLedgerOracle::new(config.oracle_url.as_str(), config.upstream_timeout)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let release = HttpReleaseEndpoint::new(config.release_url.as_str(), config.upstream_timeout)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🔮️ Ledger oracle at {}, release endpoint at {}", config.oracle_url, config.release_url);
    Ok(TradeFlowApi::new(db, oracle, release, config.trade_flow_config(), producers))
}

/// Audit hooks. Every status change and every message is logged once, off the request path.
pub fn create_event_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_trade_status_changed(|ev: TradeStatusChangedEvent| {
        Box::pin(async move {
            info!(
                "📬️ Trade {} moved {} → {} by {}",
                ev.trade.trade_id,
                ev.old_status.map(|s| s.to_string()).unwrap_or_else(|| "(new)".into()),
                ev.new_status(),
                ev.actor
            );
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks.on_message_sent(|ev: MessageSentEvent| {
        Box::pin(async move {
            debug!(
                "📬️ Message #{} in {} from {} to {}",
                ev.message.id, ev.message.conversation_id, ev.message.sender_address, ev.message.recipient_address
            );
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    api: ServerTradeApi,
    relay: MessageRelay<SqliteDatabase>,
) -> Result<Server, ServerError> {
    let caller_auth = web::Data::new(config.caller_auth.clone());
    let api = web::Data::new(api);
    let relay = web::Data::new(relay);
    let srv = HttpServer::new(move || {
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("etg::access_log"))
            .app_data(caller_auth.clone())
            .app_data(api.clone())
            .app_data(relay.clone())
            .app_data(web::JsonConfig::default().limit(64 * 1024));
        let api_scope = web::scope("/api")
            .service(RegisterSellerRoute::<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>::new())
            .service(ProposeTradeRoute::<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>::new())
            .service(MyTradesRoute::<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>::new())
            .service(TradeByIdRoute::<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>::new())
            .service(TradeHistoryRoute::<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>::new())
            .service(AcceptTradeRoute::<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>::new())
            .service(SubmitDepositRoute::<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>::new())
            .service(SettleTradeRoute::<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>::new())
            .service(RejectTradeRoute::<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>::new())
            .service(CancelTradeRoute::<SqliteDatabase, HttpLedgerOracle, HttpReleaseEndpoint>::new())
            .service(MyConversationsRoute::<SqliteDatabase>::new())
            .service(OpenConversationRoute::<SqliteDatabase>::new())
            .service(ConversationMessagesRoute::<SqliteDatabase>::new())
            .service(MarkMessageReadRoute::<SqliteDatabase>::new());
        app.service(health).service(ChatSocketRoute::<SqliteDatabase>::new()).service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
