use actix_web::{http::StatusCode, test::TestRequest};
use chrono::Utc;
use qiupay_engine::{db_types::TradeNo, traits::BillRecord};

use super::helpers::{json, AdminMode, TestContext, SHOP_KEY};

async fn submit(ctx: &TestContext, out_trade_no: &str, money: &str) -> (StatusCode, serde_json::Value) {
    let req = TestRequest::post().uri("/submit").set_form(ctx.order_form(out_trade_no, money));
    let (status, body) = ctx.call(req, AdminMode::Off).await;
    (status, json(&body))
}

#[actix_web::test]
async fn health_check() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx.call(TestRequest::get().uri("/health"), AdminMode::Off).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn submit_allocates_distinct_amounts() {
    let ctx = TestContext::new().await;
    let (status, first) = submit(&ctx, "A-1", "10.00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["code"], 1);
    assert_eq!(first["money"], "10.00");
    assert_eq!(first["out_trade_no"], "A-1");
    assert_eq!(first["qrcode"], "https://qr.example/coffee");
    assert!(first["trade_no"].as_str().is_some_and(|t| !t.is_empty()));

    let (_, second) = submit(&ctx, "A-2", "10.00").await;
    assert_eq!(second["money"], "10.01");
    ctx.tear_down().await;
}

#[actix_web::test]
async fn submit_rejections() {
    let ctx = TestContext::new().await;
    let mut form = ctx.order_form("A-1", "10.00");
    form.insert("money".into(), "0.01".into());
    let (status, body) = ctx.call(TestRequest::post().uri("/submit").set_form(form), AdminMode::Off).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let body = json(&body);
    assert_eq!(body["code"], -1);
    assert_eq!(body["msg"], "Invalid signature");

    let mut form = ctx.order_form("A-1", "10.00");
    form.remove("notify_url");
    let (status, body) = ctx.call(TestRequest::post().uri("/submit").set_form(form), AdminMode::Off).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["msg"].as_str().is_some_and(|m| m.contains("notify_url")));

    let (status, _) = submit(&ctx, "A-1", "10.00").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = submit(&ctx, "A-1", "12.00").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], -1);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn merchant_order_query() {
    let ctx = TestContext::new().await;
    let (_, created) = submit(&ctx, "A-1", "25.50").await;
    let trade_no = created["trade_no"].as_str().unwrap().to_string();
    let pid = ctx.merchant.id;

    let uri = format!("/api/order?pid={pid}&key={SHOP_KEY}&out_trade_no=A-1");
    let (status, body) = ctx.call(TestRequest::get().uri(&uri), AdminMode::Off).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["trade_no"], trade_no.as_str());
    assert_eq!(body["type"], "alipay");
    assert_eq!(body["money"], "25.50");
    assert_eq!(body["status"], 0);
    assert_eq!(body["state"], "Pending");

    let uri = format!("/api/order?pid={pid}&key=wrong&trade_no={trade_no}");
    let (status, _) = ctx.call(TestRequest::get().uri(&uri), AdminMode::Off).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/api/order?pid={pid}&key={SHOP_KEY}");
    let (status, _) = ctx.call(TestRequest::get().uri(&uri), AdminMode::Off).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/order?pid={pid}&key={SHOP_KEY}&out_trade_no=nope");
    let (status, _) = ctx.call(TestRequest::get().uri(&uri), AdminMode::Off).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn public_status_and_pay_page() {
    let ctx = TestContext::new().await;
    let form = ctx.order_form_with("A-1", "10.00", &[("return_url", "https://shop.example/done")]);
    let (_, body) = ctx.call(TestRequest::post().uri("/submit").set_form(form), AdminMode::Off).await;
    let trade_no = json(&body)["trade_no"].as_str().unwrap().to_string();

    let (status, body) =
        ctx.call(TestRequest::get().uri(&format!("/api/order/status/{trade_no}")), AdminMode::Off).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["status"], "Pending");
    assert!(body["return_url"].is_null());

    let (status, body) = ctx.call(TestRequest::get().uri(&format!("/api/pay/{trade_no}")), AdminMode::Off).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["order"]["money"], "10.00");
    assert_eq!(body["order"]["name"], "Test item");
    assert_eq!(body["qrcode_url"], "https://qr.example/coffee");

    // Once paid, the payment code disappears and the browser is sent back to the shop
    let order = ctx.api.order_status(&TradeNo::from(trade_no.clone())).await.unwrap();
    let bill = BillRecord::new(order.amount, Utc::now(), "alice");
    assert!(ctx.api.confirm_match(&order, &bill).await.unwrap().is_committed());
    let (_, body) = ctx.call(TestRequest::get().uri(&format!("/api/pay/{trade_no}")), AdminMode::Off).await;
    let body = json(&body);
    assert_eq!(body["order"]["status"], "Paid");
    assert!(body["qrcode_url"].is_null());
    assert!(body["return_url"].as_str().is_some_and(|u| u.starts_with("https://shop.example/done?")));

    let (status, body) = ctx.call(TestRequest::get().uri("/api/order/status/unknown"), AdminMode::Off).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["code"], -1);
    ctx.tear_down().await;
}

#[actix_web::test]
async fn merchant_account_query() {
    let ctx = TestContext::new().await;
    let pid = ctx.merchant.id;
    let (_, created) = submit(&ctx, "A-1", "25.50").await;
    submit(&ctx, "A-2", "3.00").await;
    let trade_no = TradeNo::from(created["trade_no"].as_str().unwrap().to_string());
    let order = ctx.api.order_status(&trade_no).await.unwrap();
    let bill = BillRecord::new(order.amount, Utc::now(), "alice");
    assert!(ctx.api.confirm_match(&order, &bill).await.unwrap().is_committed());

    let uri = format!("/api/merchant?pid={pid}&key={SHOP_KEY}");
    let (status, body) = ctx.call(TestRequest::get().uri(&uri), AdminMode::Off).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["code"], 1);
    assert_eq!(body["pid"], pid);
    assert_eq!(body["name"], "coffee");
    assert_eq!(body["active"], true);
    assert_eq!(body["money"], "25.50");
    assert_eq!(body["has_bill_source"], true);
    assert_eq!(body["orders"], 2);
    assert_eq!(body["order_today"], 2);
    assert_eq!(body["order_lastday"], 0);
    assert!(body.get("secret_key").is_none());

    let uri = format!("/api/merchant?pid={pid}&key=wrong");
    let (status, body) = ctx.call(TestRequest::get().uri(&uri), AdminMode::Off).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json(&body)["code"], -1);

    let uri = format!("/api/merchant?pid={}&key={SHOP_KEY}", pid + 100);
    let (status, _) = ctx.call(TestRequest::get().uri(&uri), AdminMode::Off).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    ctx.tear_down().await;
}
