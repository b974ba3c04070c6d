#![allow(dead_code)]
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use qiupay_engine::{
    db_types::{Merchant, NewMerchant, NewOrder, Order},
    events::EventProducers,
    helpers::generate_trade_no,
    test_utils::{
        fakes::signed_order_request,
        prepare_env::{prepare_test_env, random_db_path, tear_down_test_env},
    },
    MerchantManagement,
    OrderFlowApi,
    PaymentGatewayDatabase,
    SqliteDatabase,
};
use qpg_common::Money;

pub const SHOP_KEY: &str = "shop-secret-key";

pub async fn setup() -> OrderFlowApi<SqliteDatabase> {
    let url = random_db_path();
    let db = prepare_test_env(&url).await;
    OrderFlowApi::new(db, EventProducers::default())
}

pub async fn tear_down(db: SqliteDatabase) {
    tear_down_test_env(db).await;
}

pub async fn add_merchant<B: MerchantManagement>(db: &B, name: &str) -> Merchant {
    let merchant = NewMerchant::new(name, SHOP_KEY)
        .with_bill_credential(format!("cred-{name}"))
        .with_payment_code_url(format!("https://qr.example/{name}"));
    db.insert_merchant(merchant).await.expect("Error inserting merchant")
}

pub fn order_request(merchant: &Merchant, out_trade_no: &str, money: &str) -> HashMap<String, String> {
    signed_order_request(merchant.id, SHOP_KEY, out_trade_no, money, &[])
}

/// Inserts a pending order directly, bypassing allocation, with a controlled creation time.
pub async fn insert_order_at<B: PaymentGatewayDatabase>(
    db: &B,
    merchant: &Merchant,
    out_trade_no: &str,
    amount: Money,
    created_at: DateTime<Utc>,
    timeout: Duration,
) -> Order {
    let order = NewOrder {
        trade_no: generate_trade_no(created_at),
        out_trade_no: out_trade_no.to_string(),
        merchant_id: merchant.id,
        pay_type: "alipay".into(),
        name: "Test item".into(),
        requested_amount: amount,
        amount,
        notify_url: "https://shop.example/notify".into(),
        return_url: None,
        param: None,
        client_ip: None,
        device: "pc".into(),
        created_at,
        expires_at: created_at + timeout,
    };
    db.insert_order(order).await.expect("Error inserting order")
}

pub fn money(s: &str) -> Money {
    s.parse().expect("Invalid amount")
}
