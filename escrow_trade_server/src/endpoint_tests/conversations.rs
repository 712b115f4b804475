use actix_web::http::StatusCode;
use escrow_trade_engine::{
    db_types::{Address, ConversationId, MessageBody},
    ConversationApi,
    SqliteDatabase,
};
use serde_json::json;

use super::helpers::{get, json, post, post_empty, TestContext, BUYER, MALLORY, SELLER};

fn pair_id() -> ConversationId {
    ConversationApi::<SqliteDatabase>::conversation_id_for(&Address::new(BUYER), &Address::new(SELLER))
}

#[actix_web::test]
async fn open_direct_conversation_is_idempotent() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx.send(post("/api/conversations", BUYER, &json!({"counterparty": "0x5E11E4"}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let first = json(&body);
    assert_eq!(first["conversation_id"], pair_id().as_str());

    let (status, body) = ctx.send(post("/api/conversations", SELLER, &json!({"counterparty": BUYER}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["conversation_id"], first["conversation_id"]);
    assert_eq!(json(&body)["created_at"], first["created_at"]);

    let (status, _) = ctx.send(post("/api/conversations", BUYER, &json!({"counterparty": BUYER}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = ctx.send(get("/api/conversations", SELLER)).await;
    assert_eq!(json(&body).as_array().unwrap().len(), 1);
    let (_, body) = ctx.send(get("/api/conversations", MALLORY)).await;
    assert_eq!(body, "[]");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn message_history_and_read_receipts() {
    let ctx = TestContext::new().await;
    let id = pair_id();
    let (buyer, seller) = (Address::new(BUYER), Address::new(SELLER));
    for text in ["Is it still available?", "Does it come in blue?"] {
        ctx.relay.send(&id, &buyer, &seller, MessageBody::plain(text)).await.expect("Error sending message");
    }
    let reply = ctx.relay.send(&id, &seller, &buyer, MessageBody::plain("Yes to both")).await.unwrap();

    let path = format!("/api/conversations/{}/messages", id.as_str());
    let (status, body) = ctx.send(get(&path, SELLER)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let texts = json(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["plain_text"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(texts, ["Is it still available?", "Does it come in blue?", "Yes to both"]);

    let (_, body) = ctx.send(get(&format!("{path}?limit=1&order=newest_first"), BUYER)).await;
    let page = json(&body);
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["plain_text"], "Yes to both");

    let (status, _) = ctx.send(get(&path, MALLORY)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let read_path = format!("/api/messages/{}/read", reply.id);
    let (status, body) = ctx.send(post_empty(&read_path, SELLER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["updated"], false);
    let (_, body) = ctx.send(post_empty(&read_path, BUYER)).await;
    assert_eq!(json(&body)["updated"], true);
    let (_, body) = ctx.send(post_empty(&read_path, BUYER)).await;
    assert_eq!(json(&body)["updated"], false);
    let (status, _) = ctx.send(post_empty("/api/messages/999999/read", BUYER)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = ctx.send(get("/api/conversations", BUYER)).await;
    assert_eq!(json(&body)[0]["last_message_preview"], "Yes to both");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn trade_conversation_is_visible_to_both_parties() {
    let ctx = TestContext::new().await;
    let body = json!({"item_name": "Widget", "price": "5", "counterparty": SELLER});
    let (_, body) = ctx.send(post("/api/trades", BUYER, &body)).await;
    let trade_id = json(&body)["trade_id"].as_str().unwrap().to_string();
    let (_, body) = ctx.send(get("/api/conversations", SELLER)).await;
    let conversations = json(&body);
    assert_eq!(conversations[0]["conversation_id"], format!("trade_{trade_id}"));
    assert_eq!(conversations[0]["trade_id"], trade_id.as_str());
    let (status, _) = ctx.send(get(&format!("/api/conversations/trade_{trade_id}/messages"), MALLORY)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    ctx.tear_down().await;
}
