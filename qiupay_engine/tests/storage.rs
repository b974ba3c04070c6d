use chrono::{Duration, Utc};
use futures_util::future::join_all;
use qiupay_engine::{
    db_types::CallbackJobState,
    traits::{BillRecord, PaidTransition, TransitionOutcome},
    CallbackManagement,
    MerchantManagement,
    PaymentGatewayDatabase,
};

use crate::support::*;

mod support;

#[tokio::test]
async fn inserted_merchants_are_visible_on_every_connection() {
    let api = setup().await;
    let db = api.db();
    let mut ids = Vec::new();
    for i in 0..20 {
        ids.push(add_merchant(db, &format!("shop-{i}")).await.id);
    }
    // Concurrent reads spread over every connection in the pool
    let found = join_all(ids.iter().map(|id| db.fetch_merchant(*id))).await;
    for (id, merchant) in ids.iter().zip(found) {
        let merchant = merchant.expect("fetch_merchant failed");
        assert_eq!(merchant.map(|m| m.id), Some(*id));
    }
    tear_down(db.clone()).await;
}

#[tokio::test]
async fn merchant_updates_are_visible_on_every_connection() {
    let api = setup().await;
    let db = api.db();
    let merchant = add_merchant(db, "coffee").await;
    let updated = db.set_merchant_active(merchant.id, false).await.unwrap();
    assert!(!updated.active);
    let updated = db.update_bill_credential(merchant.id, None).await.unwrap();
    assert!(updated.bill_credential.is_none());

    let reads = join_all((0..5).map(|_| db.fetch_merchant(merchant.id))).await;
    for read in reads {
        let read = read.unwrap().expect("merchant exists");
        assert!(!read.active);
        assert!(read.bill_credential.is_none());
    }
    tear_down(db.clone()).await;
}

#[tokio::test]
async fn inserted_orders_hold_their_amount() {
    let api = setup().await;
    let db = api.db();
    let merchant = add_merchant(db, "coffee").await;
    let now = Utc::now();
    insert_order_at(db, &merchant, "A-1", money("10.00"), now, Duration::minutes(5)).await;
    insert_order_at(db, &merchant, "A-2", money("10.01"), now, Duration::minutes(5)).await;

    let reads = join_all((0..5).map(|_| db.fetch_pending_amounts(merchant.id, money("9.00"), money("11.00")))).await;
    for amounts in reads {
        assert_eq!(amounts.unwrap(), vec![money("10.00"), money("10.01")]);
    }
    tear_down(db.clone()).await;
}

#[tokio::test]
async fn claimed_callback_jobs_are_visible_as_in_flight() {
    let api = setup().await;
    let db = api.db();
    let merchant = add_merchant(db, "coffee").await;
    let now = Utc::now();
    let order = insert_order_at(db, &merchant, "A-1", money("10.00"), now, Duration::minutes(5)).await;
    let transition = PaidTransition {
        order_id: order.id,
        bill: BillRecord::new(money("10.00"), now, "payer"),
        paid_at: now,
        callback_due_at: now,
    };
    let paid = match db.mark_order_paid(transition).await.unwrap() {
        TransitionOutcome::Committed(paid) => paid,
        other => panic!("Expected the order to be paid, got {other:?}"),
    };

    let claimed = db.claim_callback_job(&paid.job).await.unwrap().expect("job is queued");
    assert_eq!(claimed.state, CallbackJobState::InFlight);
    // A second claim of the same generation finds nothing to take
    assert!(db.claim_callback_job(&paid.job).await.unwrap().is_none());
    let reads = join_all((0..5).map(|_| db.fetch_callback_job(order.id))).await;
    for job in reads {
        assert_eq!(job.unwrap().map(|j| j.state), Some(CallbackJobState::InFlight));
    }
    tear_down(db.clone()).await;
}
