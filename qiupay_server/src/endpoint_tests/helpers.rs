use std::{collections::HashMap, sync::Arc};

use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, App};
use log::debug;
use qiupay_engine::{
    callbacks::CallbackDispatcher,
    db_types::{Merchant, NewMerchant},
    events::EventProducers,
    test_utils::{
        fakes::signed_order_request,
        prepare_env::{prepare_test_env, random_db_path, tear_down_test_env},
    },
    MerchantManagement,
    OrderFlowApi,
    SqliteDatabase,
};
use qpg_common::Secret;

use super::mocks::MockNotifier;
use crate::{
    helpers::calculate_hmac,
    middleware::ADMIN_HMAC_HEADER,
    server::{configure_admin_routes, configure_public_routes},
};

pub const SHOP_KEY: &str = "endpoint-test-shop-key";
pub const ADMIN_SECRET: &str = "endpoint-test-admin-secret";

/// How the admin scope is mounted in a test app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminMode {
    Off,
    HmacChecked,
    Unchecked,
}

pub struct TestContext {
    pub api: Arc<OrderFlowApi<SqliteDatabase>>,
    pub dispatcher: Arc<CallbackDispatcher<SqliteDatabase>>,
    pub merchant: Merchant,
}

impl TestContext {
    pub async fn new() -> Self {
        let db = prepare_test_env(&random_db_path()).await;
        let merchant = NewMerchant::new("coffee", SHOP_KEY)
            .with_bill_credential("cred-coffee")
            .with_payment_code_url("https://qr.example/coffee");
        let merchant = db.insert_merchant(merchant).await.expect("Error inserting merchant");
        let api = Arc::new(OrderFlowApi::new(db.clone(), EventProducers::default()));
        // Notifications are never due during an endpoint test, so the mock must never be called
        let dispatcher = Arc::new(CallbackDispatcher::new(db, Arc::new(MockNotifier::new())));
        Self { api, dispatcher, merchant }
    }

    pub fn order_form(&self, out_trade_no: &str, money: &str) -> HashMap<String, String> {
        self.order_form_with(out_trade_no, money, &[])
    }

    pub fn order_form_with(&self, out_trade_no: &str, money: &str, extra: &[(&str, &str)]) -> HashMap<String, String> {
        signed_order_request(self.merchant.id, SHOP_KEY, out_trade_no, money, extra)
    }

    pub async fn call(&self, req: TestRequest, admin: AdminMode) -> (StatusCode, String) {
        let mut app = App::new()
            .app_data(web::Data::from(Arc::clone(&self.api)))
            .app_data(web::Data::from(Arc::clone(&self.dispatcher)))
            .configure(configure_public_routes::<SqliteDatabase>);
        if admin != AdminMode::Off {
            let checks = admin == AdminMode::HmacChecked;
            app = app.configure(|cfg| {
                configure_admin_routes::<SqliteDatabase>(cfg, Secret::new(ADMIN_SECRET.to_string()), checks)
            });
        }
        let service = test::init_service(app).await;
        debug!("Making request");
        match test::try_call_service(&service, req.to_request()).await {
            Ok(res) => {
                let status = res.status();
                let body = res.into_body().try_into_bytes().unwrap();
                (status, String::from_utf8_lossy(&body).into_owned())
            },
            Err(e) => (e.error_response().status(), e.to_string()),
        }
    }

    pub async fn tear_down(self) {
        let db = self.api.db().clone();
        drop(self);
        tear_down_test_env(db).await;
    }
}

pub fn admin_post(path: &str) -> TestRequest {
    TestRequest::post().uri(path).insert_header((ADMIN_HMAC_HEADER, calculate_hmac(ADMIN_SECRET, path.as_bytes())))
}

pub fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"))
}

