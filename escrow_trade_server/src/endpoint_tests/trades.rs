use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use actix_web::{http::StatusCode, test::TestRequest};
use escrow_trade_engine::{
    db_types::{Address, AssetAmount, TradeId, TradeStatusType},
    ledger::{ReleaseEndpoint, ReleaseError, ReleaseReceipt},
};
use serde_json::json;

use super::{
    helpers::{get, json, post, post_empty, signed, TestContext, BUYER, ESCROW, MALLORY, SELLER},
    mocks::MockRelease,
};
use crate::auth::CALLER_ADDRESS_HEADER;

/// Buyer proposes, seller accepts. Returns the trade id.
async fn accepted_trade<R>(ctx: &TestContext<R>, price: serde_json::Value) -> String
where R: ReleaseEndpoint + 'static {
    let body = json!({"item_name": "Widget", "price": price, "counterparty": SELLER});
    let (status, body) = ctx.send(post("/api/trades", BUYER, &body)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let trade_id = json(&body)["trade_id"].as_str().expect("No trade id").to_string();
    let (status, body) = ctx.send(post_empty(&format!("/api/trades/{trade_id}/accept"), SELLER)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    trade_id
}

#[actix_web::test]
async fn health_needs_no_identity() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx.send(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn api_requires_a_signed_caller() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx.send(TestRequest::get().uri("/api/trades")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No caller address"), "{body}");

    let forged = TestRequest::get()
        .uri("/api/trades")
        .insert_header((CALLER_ADDRESS_HEADER, BUYER))
        .insert_header(("etg_caller_hmac", "AAAA"));
    let (status, _) = ctx.send(forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = ctx.send(signed(TestRequest::get().uri("/api/trades"), BUYER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn happy_path_over_http() {
    let ctx = TestContext::new().await;
    let body = json!({"item_name": "Widget", "description": "Blue", "price": 2.5, "counterparty": SELLER});
    let (status, body) = ctx.send(post("/api/trades", BUYER, &body)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let trade = json(&body);
    assert_eq!(trade["status"], "PENDING");
    assert_eq!(trade["price"], 2_500_000);
    let trade_id = trade["trade_id"].as_str().unwrap().to_string();

    let (status, body) = ctx.send(post_empty(&format!("/api/trades/{trade_id}/accept"), SELLER)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let instructions = &json(&body)["deposit_instructions"];
    assert_eq!(instructions["escrow_address"], ESCROW);
    assert_eq!(instructions["amount"], 2_500_000);
    assert_eq!(instructions["display_amount"], "2.5");

    ctx.ledger.add_transfer("tx-1", AssetAmount::from(2_500_000), &Address::new(ESCROW), &Address::new(BUYER)).await;
    let path = format!("/api/trades/{trade_id}/deposit");
    let (status, body) = ctx.send(post(&path, BUYER, &json!({"tx_ref": "tx-1"}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["trade"]["status"], "DEPOSIT_CONFIRMED");
    assert!(result.get("advisory").is_none());

    let path = format!("/api/trades/{trade_id}/settle");
    let (status, body) = ctx.send(post(&path, BUYER, &json!({"artifact": "signed-release"}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["trade"]["status"], "SUCCESS");
    assert!(result["trade"]["settle_tx_ref"].as_str().unwrap().starts_with("release-"));

    let (status, _) = ctx.send(post(&path, BUYER, &json!({"artifact": "again"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = ctx.send(get(&format!("/api/trades/{trade_id}/history"), SELLER)).await;
    assert_eq!(status, StatusCode::OK);
    let statuses = json(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["to_status"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(statuses, ["PENDING", "ACCEPTED", "DEPOSIT_PENDING", "DEPOSIT_CONFIRMED", "SETTLE_PENDING", "SUCCESS"]);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn failed_verification_is_an_advisory() {
    let ctx = TestContext::new().await;
    let trade_id = accepted_trade(&ctx, json!("2.5")).await;
    let escrow = Address::new(ESCROW);
    let buyer = Address::new(BUYER);
    ctx.ledger.add_transfer("tx-short", AssetAmount::from(2_000_000), &escrow, &buyer).await;
    ctx.ledger.add_transfer("tx-full", AssetAmount::from(2_500_000), &escrow, &buyer).await;

    let path = format!("/api/trades/{trade_id}/deposit");
    let (status, body) = ctx.send(post(&path, BUYER, &json!({"tx_ref": "tx-short"}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["trade"]["status"], "DEPOSIT_PENDING");
    assert_eq!(result["advisory"]["kind"], "verification_failed");
    assert!(result["advisory"]["reason"].as_str().unwrap().contains("Amount mismatch"));

    let (status, body) = ctx.send(get(&format!("/api/trades/{trade_id}"), BUYER)).await;
    assert_eq!(status, StatusCode::OK);
    let details = json(&body);
    assert_eq!(details["role"], "buyer");
    assert!(details["verification_error"].as_str().unwrap().contains("Amount mismatch"));

    let (status, body) = ctx.send(post(&path, BUYER, &json!({"deposit_tx_ref": "tx-full"}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["trade"]["status"], "DEPOSIT_CONFIRMED");

    let (_, body) = ctx.send(get(&format!("/api/trades/{trade_id}"), SELLER)).await;
    let details = json(&body);
    assert_eq!(details["role"], "seller");
    assert!(details.get("verification_error").is_none());
    ctx.tear_down().await;
}

#[actix_web::test]
async fn request_errors_map_to_status_codes() {
    let ctx = TestContext::new().await;
    let body = json!({"item_name": "Widget", "price": "abc", "counterparty": SELLER});
    let (status, _) = ctx.send(post("/api/trades", BUYER, &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({"item_name": "Widget", "price": "1", "counterparty": SELLER});
    let (_, body) = ctx.send(post("/api/trades", BUYER, &body)).await;
    let trade_id = json(&body)["trade_id"].as_str().unwrap().to_string();

    let (status, _) = ctx.send(get(&format!("/api/trades/{trade_id}"), MALLORY)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx.send(post_empty(&format!("/api/trades/{trade_id}/accept"), BUYER)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx.send(post_empty(&format!("/api/trades/{trade_id}/accept"), SELLER)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = ctx.send(post_empty(&format!("/api/trades/{trade_id}/accept"), SELLER)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json(&body)["error"].is_string());
    let (status, _) = ctx.send(get("/api/trades/no-such-trade", BUYER)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = ctx.send(post(&format!("/api/trades/{trade_id}/deposit"), BUYER, &json!({"tx_ref": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn reject_and_cancel() {
    let ctx = TestContext::new().await;
    let body = json!({"item_name": "Lamp", "price": "3", "counterparty": SELLER});
    let (_, body) = ctx.send(post("/api/trades", BUYER, &body)).await;
    let rejected = json(&body)["trade_id"].as_str().unwrap().to_string();
    let (status, body) = ctx.send(post_empty(&format!("/api/trades/{rejected}/reject"), SELLER)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["status"], "REJECTED");

    let cancelled = accepted_trade(&ctx, json!(4)).await;
    let (status, body) = ctx.send(post_empty(&format!("/api/trades/{cancelled}/cancel"), BUYER)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["status"], "CANCELLED");
    let (status, _) = ctx.send(post_empty(&format!("/api/trades/{cancelled}/reject"), SELLER)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = ctx.send(get("/api/trades", SELLER)).await;
    assert_eq!(json(&body).as_array().unwrap().len(), 2);
    let (_, body) = ctx.send(get("/api/trades", MALLORY)).await;
    assert_eq!(body, "[]");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn sellers_register_themselves() {
    let ctx = TestContext::new().await;
    let (status, _) = ctx.send(post("/api/trades", BUYER, &body_for("0xnew"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = ctx.send(post_empty("/api/sellers/register", "0xNEW")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["address"], "0xnew");
    let (status, _) = ctx.send(post("/api/trades", BUYER, &body_for("0xnew"))).await;
    assert_eq!(status, StatusCode::OK);
    ctx.tear_down().await;
}

fn body_for(seller: &str) -> serde_json::Value {
    json!({"item_name": "Lamp", "price": "3", "counterparty": seller})
}

#[actix_web::test]
async fn release_outage_is_an_advisory() {
    let mut release = MockRelease::new();
    let calls = Arc::new(AtomicUsize::new(0));
    release.expect_release().times(2).returning(move |r| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(ReleaseError::Unavailable("connection refused".into()))
        } else {
            Ok(ReleaseReceipt::released(format!("rel-{}", r.trade_id)))
        }
    });
    let ctx = TestContext::with_release(release).await;
    let trade_id = accepted_trade(&ctx, json!("1.25")).await;
    let escrow = Address::new(ESCROW);
    ctx.ledger.add_transfer("tx-9", AssetAmount::from(1_250_000), &escrow, &Address::new(BUYER)).await;
    let (_, body) =
        ctx.send(post(&format!("/api/trades/{trade_id}/deposit"), BUYER, &json!({"tx_ref": "tx-9"}))).await;
    assert_eq!(json(&body)["trade"]["status"], "DEPOSIT_CONFIRMED");

    let path = format!("/api/trades/{trade_id}/settle");
    let (status, body) = ctx.send(post(&path, SELLER, &json!({"artifact": "sig"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, body) = ctx.send(post(&path, BUYER, &json!({"artifact": "sig"}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["trade"]["status"], "SETTLE_PENDING");
    assert_eq!(result["advisory"]["kind"], "upstream_unavailable");

    let (status, body) = ctx.send(post(&path, BUYER, &json!({"artifact": "sig"}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["trade"]["status"], "SUCCESS");
    assert_eq!(result["trade"]["settle_tx_ref"], format!("rel-{trade_id}"));
    let view = ctx.api.trade(&TradeId::from(trade_id.clone()), &Address::new(BUYER)).await.unwrap();
    assert_eq!(view.trade.status, TradeStatusType::Success);
    ctx.tear_down().await;
}
