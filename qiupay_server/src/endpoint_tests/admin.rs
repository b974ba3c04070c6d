use actix_web::{http::StatusCode, test::TestRequest};
use chrono::Utc;
use qiupay_engine::{
    db_types::{OrderStatusType, TradeNo},
    traits::BillRecord,
};

use super::helpers::{admin_post, json, AdminMode, TestContext};
use crate::middleware::ADMIN_HMAC_HEADER;

async fn new_order(ctx: &TestContext, out_trade_no: &str) -> TradeNo {
    let created = ctx.api.create_order(&ctx.order_form(out_trade_no, "10.00")).await.expect("Error creating order");
    created.trade_no
}

#[actix_web::test]
async fn cancel_requires_a_valid_hmac() {
    let ctx = TestContext::new().await;
    let trade_no = new_order(&ctx, "A-1").await;
    let path = format!("/admin/orders/{trade_no}/cancel");

    let (status, body) = ctx.call(TestRequest::post().uri(&path), AdminMode::HmacChecked).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "No HMAC signature found.");

    let req = TestRequest::post().uri(&path).insert_header((ADMIN_HMAC_HEADER, "bm90IGEgc2lnbmF0dXJl"));
    let (status, body) = ctx.call(req, AdminMode::HmacChecked).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "Invalid HMAC signature.");

    // A signature for another path does not carry over
    let other = format!("/admin/orders/{trade_no}/renotify");
    let req = admin_post(&other).uri(&path);
    let (status, _) = ctx.call(req, AdminMode::HmacChecked).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let order = ctx.api.order_status(&trade_no).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn cancel_order() {
    let ctx = TestContext::new().await;
    let trade_no = new_order(&ctx, "A-1").await;
    let path = format!("/admin/orders/{trade_no}/cancel");

    let (status, body) = ctx.call(admin_post(&path), AdminMode::HmacChecked).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["code"], 1);
    let order = ctx.api.order_status(&trade_no).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Canceled);

    let (status, body) = ctx.call(admin_post(&path), AdminMode::HmacChecked).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let body = json(&body);
    assert_eq!(body["code"], -1);
    assert_eq!(body["msg"], format!("Order {trade_no} is already Canceled"));

    let (status, _) = ctx.call(admin_post("/admin/orders/unknown/cancel"), AdminMode::HmacChecked).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn renotify_paid_order() {
    let ctx = TestContext::new().await;
    let trade_no = new_order(&ctx, "A-1").await;
    let path = format!("/admin/orders/{trade_no}/renotify");

    let (status, body) = ctx.call(admin_post(&path), AdminMode::HmacChecked).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json(&body)["msg"].as_str().is_some_and(|m| m.contains("Only paid orders")));

    let order = ctx.api.order_status(&trade_no).await.unwrap();
    let bill = BillRecord::new(order.amount, Utc::now(), "alice");
    assert!(ctx.api.confirm_match(&order, &bill).await.unwrap().is_committed());

    let (status, body) = ctx.call(admin_post(&path), AdminMode::HmacChecked).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["code"], 1);
    assert_eq!(body["generation"], 2);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn admin_routes_are_only_mounted_when_configured() {
    let ctx = TestContext::new().await;
    let trade_no = new_order(&ctx, "A-1").await;
    let path = format!("/admin/orders/{trade_no}/cancel");

    let (status, _) = ctx.call(admin_post(&path), AdminMode::Off).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx.call(TestRequest::post().uri(&path), AdminMode::Unchecked).await;
    assert_eq!(status, StatusCode::OK);
    ctx.tear_down().await;
}
