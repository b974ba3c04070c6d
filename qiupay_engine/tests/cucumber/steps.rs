use std::sync::Arc;

use chrono::{Duration, Utc};
use cucumber::{then, when};
use qiupay_engine::{
    db_types::OrderStatusType,
    matcher::{MerchantLane, PollerConfig},
    test_utils::fakes::signed_order_request,
    traits::BillRecord,
    MerchantManagement,
    OrderFlowError,
};
use qpg_common::Money;

use crate::cucumber::{setups::MERCHANT_KEY, QiuPayWorld};

fn money(s: &str) -> Money {
    s.parse().expect("Not a valid amount")
}

#[when(expr = "merchant '{word}' requests order {word} for {word}")]
async fn request_order(world: &mut QiuPayWorld, name: String, out_trade_no: String, amount: String) {
    let system = world.system();
    let pid = system.merchant(&name).id;
    let params = signed_order_request(pid, MERCHANT_KEY, &out_trade_no, &amount, &[]);
    match system.api.create_order(&params).await {
        Ok(created) => {
            system.orders.insert(out_trade_no, created);
            system.last_error = None;
        },
        Err(e) => system.last_error = Some(e),
    }
}

#[when(expr = "merchant '{word}' sends order {word} for {word} with a tampered amount")]
async fn tampered_order(world: &mut QiuPayWorld, name: String, out_trade_no: String, amount: String) {
    let system = world.system();
    let pid = system.merchant(&name).id;
    let mut params = signed_order_request(pid, MERCHANT_KEY, &out_trade_no, &amount, &[]);
    params.insert("money".into(), "0.01".into());
    system.last_error = system.api.create_order(&params).await.err();
}

#[when(expr = "a transfer of {word} arrives for merchant '{word}'")]
async fn transfer_arrives(world: &mut QiuPayWorld, amount: String, name: String) {
    let system = world.system();
    let id = system.merchant(&name).id;
    system.bills.push_bill(id, BillRecord::new(money(&amount), Utc::now(), "payer"));
}

#[when(expr = "the poller runs for merchant '{word}'")]
async fn poll(world: &mut QiuPayWorld, name: String) {
    let system = world.system();
    let merchant = system.api.db().fetch_merchant(system.merchant(&name).id).await.unwrap().unwrap();
    let mut lane =
        MerchantLane::new(&merchant, Arc::clone(&system.api), system.bills.clone(), PollerConfig::default()).unwrap();
    lane.poll_once().await.expect("Polling cycle failed");
}

#[when(expr = "an administrator cancels order {word}")]
async fn cancel(world: &mut QiuPayWorld, out_trade_no: String) {
    let system = world.system();
    let trade_no = system.order(&out_trade_no).trade_no.clone();
    system.api.cancel_order(&trade_no).await.expect("Error canceling order");
}

#[when(expr = "the expiry sweep runs {int} minutes from now")]
async fn expiry_sweep(world: &mut QiuPayWorld, minutes: i64) {
    let system = world.system();
    system.api.expire_orders(Utc::now() + Duration::minutes(minutes)).await.expect("Error expiring orders");
}

#[then(expr = "order {word} is allocated {word}")]
async fn allocated(world: &mut QiuPayWorld, out_trade_no: String, amount: String) {
    let system = world.system();
    assert_eq!(system.order(&out_trade_no).money, money(&amount));
}

#[then(expr = "order {word} is {word}")]
async fn order_status(world: &mut QiuPayWorld, out_trade_no: String, status: String) {
    let system = world.system();
    let expected = status.parse::<OrderStatusType>().expect("Not a valid order status");
    let trade_no = system.order(&out_trade_no).trade_no.clone();
    let order = system.api.order_status(&trade_no).await.expect("Error fetching order");
    assert_eq!(order.status, expected);
}

#[then("the request is rejected with an invalid signature")]
async fn rejected(world: &mut QiuPayWorld) {
    let system = world.system();
    assert!(matches!(system.last_error, Some(OrderFlowError::InvalidSignature)), "{:?}", system.last_error);
}
