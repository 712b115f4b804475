use cucumber::{given, then, when};
use escrow_trade_engine::{
    db_types::{AssetSpec, HistoryOrder, MessageBody, Role, TradeStatusType},
    trade_objects::TradeProposal,
};

use crate::{
    cucumber::{
        world::{error_kind, party},
        EscrowWorld,
    },
    support::{escrow, TestSystem},
};

#[given("a fresh escrow system")]
async fn fresh_system(world: &mut EscrowWorld) {
    world.system = Some(TestSystem::new().await);
}

#[given(expr = "the ledger holds a confirmed transfer {string} of {word} from the {word} to escrow")]
async fn ledger_transfer(world: &mut EscrowWorld, tx_ref: String, amount: String, from: String) {
    let amount = AssetSpec::new("USDC", 6).parse_decimal(&amount).expect("Bad amount");
    world.system().ledger.add_transfer(&tx_ref, amount, &escrow(), &party(&from)).await;
}

#[when(expr = "the {word} proposes {string} for {word} to the {word}")]
async fn propose(world: &mut EscrowWorld, proposer: String, item: String, price: String, counterparty: String) {
    let role = if proposer == "seller" { Role::Seller } else { Role::Buyer };
    let proposal = TradeProposal {
        item_name: item,
        description: String::new(),
        price,
        counterparty: party(&counterparty),
        role,
    };
    let result = world.api().propose(proposal, &party(&proposer)).await;
    if let Some(trade) = world.record(result) {
        world.trade_id = Some(trade.trade_id);
    }
}

#[when(expr = "the {word} accepts the trade")]
async fn accept(world: &mut EscrowWorld, who: String) {
    let result = world.api().accept(&world.trade_id(), &party(&who)).await;
    world.record(result);
}

#[when(expr = "the {word} rejects the trade")]
async fn reject(world: &mut EscrowWorld, who: String) {
    let result = world.api().reject(&world.trade_id(), &party(&who)).await;
    world.record(result);
}

#[when(expr = "the {word} submits deposit {string}")]
async fn submit_deposit(world: &mut EscrowWorld, who: String, tx_ref: String) {
    let result = world.api().submit_deposit(&world.trade_id(), &party(&who), &tx_ref).await;
    world.record(result);
}

#[when(expr = "the {word} settles with artifact {string}")]
async fn settle(world: &mut EscrowWorld, who: String, artifact: String) {
    let result = world.api().settle(&world.trade_id(), &party(&who), &artifact).await;
    world.record(result);
}

#[when(expr = "the {word} sends {string} to the {word} directly")]
async fn send_direct(world: &mut EscrowWorld, from: String, text: String, to: String) {
    let id = world.direct_conversation();
    world
        .system()
        .relay
        .send(&id, &party(&from), &party(&to), MessageBody::plain(text))
        .await
        .expect("Error sending message");
}

#[then(expr = "the trade is {word}")]
async fn trade_status(world: &mut EscrowWorld, status: String) {
    let expected: TradeStatusType = status.parse().expect("Not a trade status");
    let view = world.api().trade(&world.trade_id(), &party("buyer")).await.expect("Error fetching trade");
    assert_eq!(view.trade.status, expected);
}

#[then("the trade has a settlement reference")]
async fn has_settlement_ref(world: &mut EscrowWorld) {
    let view = world.api().trade(&world.trade_id(), &party("seller")).await.expect("Error fetching trade");
    assert!(view.trade.settle_tx_ref.is_some());
}

#[then("the trade shows a verification error")]
async fn shows_verification_error(world: &mut EscrowWorld) {
    let view = world.api().trade(&world.trade_id(), &party("buyer")).await.expect("Error fetching trade");
    assert!(view.trade.verification_error.is_some());
}

#[then(expr = "the request fails with {word}")]
async fn request_fails(world: &mut EscrowWorld, kind: String) {
    let err = world.last_error.take().expect("The last request did not fail");
    assert_eq!(error_kind(&err), kind, "{err}");
}

#[then(expr = "the {word} has {int} conversations")]
async fn conversation_count(world: &mut EscrowWorld, who: String, count: usize) {
    let convs = world.system().relay.conversations().conversations_for(&party(&who)).await.expect("Error listing");
    assert_eq!(convs.len(), count);
}

#[then(expr = "the trade conversation has {int} messages")]
async fn trade_conversation_messages(world: &mut EscrowWorld, count: usize) {
    let id = escrow_trade_engine::db_types::ConversationId::for_trade(&world.trade_id());
    let messages =
        world.system().relay.history(&id, &party("buyer"), None, None, HistoryOrder::OldestFirst).await.expect("history");
    assert_eq!(messages.len(), count);
}

#[then(expr = "the direct conversation has {int} messages")]
async fn direct_conversation_messages(world: &mut EscrowWorld, count: usize) {
    let id = world.direct_conversation();
    let messages =
        world.system().relay.history(&id, &party("seller"), None, None, HistoryOrder::OldestFirst).await.expect("history");
    assert_eq!(messages.len(), count);
}
