//! Request handler definitions
//!
//! Define each route and its handler here. Handlers stay thin: they extract the [`Caller`], call the engine API and
//! convert the result. Anything longer belongs in the engine.
//!
//! Every handler under `/api` takes a [`Caller`] argument, so a request without a verified caller address is refused
//! before the handler runs.
//!
//! Deposit and settlement requests can end with an *advisory* (verification failed, release refused, upstream
//! unavailable). These are not request failures: the response is `200 OK` with the unchanged trade and an `advisory`
//! field, and the client may fix its input or retry.
use actix_web::{get, web, HttpResponse, Responder};
use escrow_trade_engine::{
    db_types::{ConversationId, TradeId},
    ledger::{LedgerOracle, ReleaseEndpoint},
    ConversationManagement,
    EscrowDatabase,
    MessageRelay,
    TradeFlowApi,
};
use log::*;

use crate::{
    auth::Caller,
    data_objects::{
        AcceptResponse,
        DepositParams,
        HistoryParams,
        MarkReadResponse,
        OpenConversationParams,
        ProposeTradeParams,
        SettleParams,
        TradeDetails,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
// `route!(name => Method "/path" impl BoundA, BoundB)` defines `NameRoute<TBoundA, TBoundB>`, which registers
// `name::<TBoundA, TBoundB>` as the handler. The handler's type parameters must be declared in the same order.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

type TradeApi<B, L, R> = web::Data<TradeFlowApi<B, L, R>>;

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Sellers  ----------------------------------------------------
route!(register_seller => Post "/sellers/register" impl EscrowDatabase, LedgerOracle, ReleaseEndpoint);
/// The caller registers themselves as a seller. Registering twice is harmless.
pub async fn register_seller<B, L, R>(caller: Caller, api: TradeApi<B, L, R>) -> Result<HttpResponse, ServerError>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    debug!("💻️ Seller registration request from {}", *caller);
    let seller = api.register_seller(&caller).await?;
    Ok(HttpResponse::Ok().json(seller))
}

//----------------------------------------------   Trades  ----------------------------------------------------
route!(propose_trade => Post "/trades" impl EscrowDatabase, LedgerOracle, ReleaseEndpoint);
/// Creates a trade in `PENDING` and opens its conversation. The counterparty accepts or rejects it.
pub async fn propose_trade<B, L, R>(
    caller: Caller,
    body: web::Json<ProposeTradeParams>,
    api: TradeApi<B, L, R>,
) -> Result<HttpResponse, ServerError>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    let params = body.into_inner();
    debug!("💻️ {} proposes a trade for '{}' to {}", *caller, params.item_name, params.counterparty);
    let trade = api.propose(params.into(), &caller).await?;
    Ok(HttpResponse::Ok().json(trade))
}

route!(my_trades => Get "/trades" impl EscrowDatabase, LedgerOracle, ReleaseEndpoint);
pub async fn my_trades<B, L, R>(caller: Caller, api: TradeApi<B, L, R>) -> Result<HttpResponse, ServerError>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    trace!("💻️ Fetching trades for {}", *caller);
    let trades = api.trades_for(&caller).await?;
    Ok(HttpResponse::Ok().json(trades))
}

route!(trade_by_id => Get "/trades/{trade_id}" impl EscrowDatabase, LedgerOracle, ReleaseEndpoint);
pub async fn trade_by_id<B, L, R>(
    caller: Caller,
    path: web::Path<TradeId>,
    api: TradeApi<B, L, R>,
) -> Result<HttpResponse, ServerError>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    let trade_id = path.into_inner();
    trace!("💻️ {} requested trade {trade_id}", *caller);
    let view = api.trade(&trade_id, &caller).await?;
    Ok(HttpResponse::Ok().json(TradeDetails::from(view)))
}

route!(trade_history => Get "/trades/{trade_id}/history" impl EscrowDatabase, LedgerOracle, ReleaseEndpoint);
pub async fn trade_history<B, L, R>(
    caller: Caller,
    path: web::Path<TradeId>,
    api: TradeApi<B, L, R>,
) -> Result<HttpResponse, ServerError>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    let events = api.history(&path.into_inner(), &caller).await?;
    Ok(HttpResponse::Ok().json(events))
}

route!(accept_trade => Post "/trades/{trade_id}/accept" impl EscrowDatabase, LedgerOracle, ReleaseEndpoint);
/// The counterparty accepts the proposal. The response tells the buyer where and how much to deposit.
pub async fn accept_trade<B, L, R>(
    caller: Caller,
    path: web::Path<TradeId>,
    api: TradeApi<B, L, R>,
) -> Result<HttpResponse, ServerError>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    let trade_id = path.into_inner();
    debug!("💻️ {} accepts trade {trade_id}", *caller);
    let deposit_instructions = api.accept(&trade_id, &caller).await?;
    Ok(HttpResponse::Ok().json(AcceptResponse { deposit_instructions }))
}

route!(submit_deposit => Post "/trades/{trade_id}/deposit" impl EscrowDatabase, LedgerOracle, ReleaseEndpoint);
/// The buyer reports the ledger reference of their deposit. Verification runs before the response is sent.
pub async fn submit_deposit<B, L, R>(
    caller: Caller,
    path: web::Path<TradeId>,
    body: web::Json<DepositParams>,
    api: TradeApi<B, L, R>,
) -> Result<HttpResponse, ServerError>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    let trade_id = path.into_inner();
    debug!("💻️ {} submitted deposit {} for trade {trade_id}", *caller, body.tx_ref);
    let result = api.submit_deposit(&trade_id, &caller, &body.tx_ref).await?;
    if let Some(advisory) = &result.advisory {
        info!("💻️ Deposit for trade {trade_id} is not confirmed yet. {advisory}");
    }
    Ok(HttpResponse::Ok().json(result))
}

route!(settle_trade => Post "/trades/{trade_id}/settle" impl EscrowDatabase, LedgerOracle, ReleaseEndpoint);
pub async fn settle_trade<B, L, R>(
    caller: Caller,
    path: web::Path<TradeId>,
    body: web::Json<SettleParams>,
    api: TradeApi<B, L, R>,
) -> Result<HttpResponse, ServerError>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    let trade_id = path.into_inner();
    debug!("💻️ {} settles trade {trade_id}", *caller);
    let result = api.settle(&trade_id, &caller, &body.artifact).await?;
    if let Some(advisory) = &result.advisory {
        info!("💻️ Settlement of trade {trade_id} did not complete. {advisory}");
    }
    Ok(HttpResponse::Ok().json(result))
}

route!(reject_trade => Post "/trades/{trade_id}/reject" impl EscrowDatabase, LedgerOracle, ReleaseEndpoint);
pub async fn reject_trade<B, L, R>(
    caller: Caller,
    path: web::Path<TradeId>,
    api: TradeApi<B, L, R>,
) -> Result<HttpResponse, ServerError>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    let trade_id = path.into_inner();
    debug!("💻️ {} rejects trade {trade_id}", *caller);
    let trade = api.reject(&trade_id, &caller).await?;
    Ok(HttpResponse::Ok().json(trade))
}

route!(cancel_trade => Post "/trades/{trade_id}/cancel" impl EscrowDatabase, LedgerOracle, ReleaseEndpoint);
pub async fn cancel_trade<B, L, R>(
    caller: Caller,
    path: web::Path<TradeId>,
    api: TradeApi<B, L, R>,
) -> Result<HttpResponse, ServerError>
where
    B: EscrowDatabase,
    L: LedgerOracle,
    R: ReleaseEndpoint,
{
    let trade_id = path.into_inner();
    debug!("💻️ {} cancels trade {trade_id}", *caller);
    let trade = api.cancel(&trade_id, &caller).await?;
    Ok(HttpResponse::Ok().json(trade))
}

//----------------------------------------------   Conversations  ----------------------------------------------------
route!(my_conversations => Get "/conversations" impl ConversationManagement);
/// The caller's conversations, most recently active first.
pub async fn my_conversations<B: ConversationManagement>(
    caller: Caller,
    relay: web::Data<MessageRelay<B>>,
) -> Result<HttpResponse, ServerError> {
    let conversations = relay.conversations().conversations_for(&caller).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

route!(open_conversation => Post "/conversations" impl ConversationManagement);
/// Opens the direct conversation between the caller and a counterparty. Calling it again returns the same conversation.
pub async fn open_conversation<B: ConversationManagement>(
    caller: Caller,
    body: web::Json<OpenConversationParams>,
    relay: web::Data<MessageRelay<B>>,
) -> Result<HttpResponse, ServerError> {
    let conversation = relay.conversations().open_direct(&caller, &body.counterparty).await?;
    Ok(HttpResponse::Ok().json(conversation))
}

route!(conversation_messages => Get "/conversations/{conversation_id}/messages" impl ConversationManagement);
pub async fn conversation_messages<B: ConversationManagement>(
    caller: Caller,
    path: web::Path<ConversationId>,
    query: web::Query<HistoryParams>,
    relay: web::Data<MessageRelay<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let HistoryParams { limit, offset, order } = query.into_inner();
    let messages = relay.history(&id, &caller, limit, offset, order).await?;
    Ok(HttpResponse::Ok().json(messages))
}

route!(mark_message_read => Post "/messages/{message_id}/read" impl ConversationManagement);
pub async fn mark_message_read<B: ConversationManagement>(
    caller: Caller,
    path: web::Path<i64>,
    relay: web::Data<MessageRelay<B>>,
) -> Result<HttpResponse, ServerError> {
    let message_id = path.into_inner();
    let updated = relay.mark_read(message_id, &caller).await?;
    Ok(HttpResponse::Ok().json(MarkReadResponse { message_id, updated }))
}
