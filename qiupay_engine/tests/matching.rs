use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{Duration, Utc};
use qiupay_engine::{
    db_types::OrderStatusType,
    matcher::{LaneError, LaneState, MerchantLane, PollerConfig},
    test_utils::fakes::{HangingBillSource, ScriptedBillSource},
    traits::{BillRecord, BillSource, BillSourceError},
    CallbackManagement,
    MerchantManagement,
    OrderFlowApi,
    SqliteDatabase,
};

use crate::support::*;

mod support;

fn fast_config() -> PollerConfig {
    PollerConfig {
        interval: StdDuration::from_millis(10),
        max_backoff: StdDuration::from_millis(80),
        fetch_timeout: StdDuration::from_millis(200),
    }
}

async fn lane_for(
    api: &Arc<OrderFlowApi<SqliteDatabase>>,
    merchant_id: i64,
    source: Arc<dyn BillSource>,
) -> MerchantLane<SqliteDatabase> {
    let merchant = api.db().fetch_merchant(merchant_id).await.unwrap().unwrap();
    MerchantLane::new(&merchant, Arc::clone(api), source, fast_config()).expect("merchant has a bill source")
}

#[tokio::test]
async fn matching_bill_pays_the_order() {
    let api = Arc::new(setup().await);
    let merchant = add_merchant(api.db(), "coffee").await;
    let a = api.create_order(&order_request(&merchant, "A-1", "10.00")).await.unwrap();
    let b = api.create_order(&order_request(&merchant, "A-2", "10.00")).await.unwrap();
    let source = Arc::new(ScriptedBillSource::new());
    source.push_bill(merchant.id, BillRecord::new(money("10.01"), Utc::now(), "alice").with_provider_txn_id("t1"));
    source.push_bill(merchant.id, BillRecord::new(money("3.33"), Utc::now(), "bob"));

    let mut lane = lane_for(&api, merchant.id, source.clone()).await;
    let report = lane.poll_once().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.paid, vec![b.trade_no.clone()]);
    assert_eq!(report.unmatched, 1);
    assert_eq!(lane.state(), LaneState::Idle);

    let paid = api.order_status(&b.trade_no).await.unwrap();
    assert_eq!(paid.status, OrderStatusType::Paid);
    let paid_at = paid.paid_at.expect("paid_at is stamped");
    let job = api.db().fetch_callback_job(paid.id).await.unwrap().expect("a callback job is queued");
    assert_eq!(job.attempts_made, 0);
    assert_eq!(job.next_attempt_at, paid_at + Duration::seconds(5));
    assert_eq!(api.order_status(&a.trade_no).await.unwrap().status, OrderStatusType::Pending);

    // The consumed bill is skipped from now on
    let report = lane.poll_once().await.unwrap();
    assert_eq!(report.already_consumed, 1);
    assert!(report.paid.is_empty());
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn bills_outside_the_payment_window_are_ignored() {
    let api = Arc::new(setup().await);
    let merchant = add_merchant(api.db(), "coffee").await;
    let created_at = Utc::now() - Duration::minutes(5);
    let order = insert_order_at(api.db(), &merchant, "A-1", money("8.00"), created_at, Duration::minutes(10)).await;
    let source = Arc::new(ScriptedBillSource::new());
    // Observed before the order existed: it cannot be a payment for it
    let early = BillRecord::new(money("8.00"), created_at - Duration::seconds(1), "alice");
    let mut lane = lane_for(&api, merchant.id, source.clone()).await;
    source.push_bill(merchant.id, early);
    let report = lane.poll_once().await.unwrap();
    assert!(report.paid.is_empty());
    assert_eq!(api.order_status(&order.trade_no).await.unwrap().status, OrderStatusType::Pending);

    // Observed exactly at the expiry instant still counts
    source.push_bill(merchant.id, BillRecord::new(money("8.00"), order.expires_at, "alice"));
    let report = lane.poll_once().await.unwrap();
    assert_eq!(report.paid, vec![order.trade_no.clone()]);
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn timed_out_orders_are_never_paid() {
    let api = Arc::new(setup().await);
    let merchant = add_merchant(api.db(), "coffee").await;
    let created_at = Utc::now() - Duration::minutes(30);
    let expired =
        insert_order_at(api.db(), &merchant, "A-1", money("10.00"), created_at, Duration::minutes(10)).await;
    let open = api.create_order(&order_request(&merchant, "A-2", "20.00")).await.unwrap();
    assert_eq!(api.expire_orders(Utc::now()).await.unwrap().len(), 1);

    let source = Arc::new(ScriptedBillSource::new());
    source.push_bill(merchant.id, BillRecord::new(money("10.00"), Utc::now(), "alice").with_provider_txn_id("late"));
    let mut lane = lane_for(&api, merchant.id, source.clone()).await;
    let report = lane.poll_once().await.unwrap();
    assert!(report.paid.is_empty());
    assert_eq!(report.late, vec![expired.trade_no.clone()]);
    assert_eq!(api.order_status(&expired.trade_no).await.unwrap().status, OrderStatusType::Timeout);

    // Reported once only
    let report = lane.poll_once().await.unwrap();
    assert!(report.late.is_empty());
    assert_eq!(report.unmatched, 1);
    assert_eq!(api.order_status(&open.trade_no).await.unwrap().status, OrderStatusType::Pending);
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn payments_seen_after_the_expiry_sweep_are_reported() {
    let api = Arc::new(setup().await);
    let merchant = add_merchant(api.db(), "coffee").await;
    let created_at = Utc::now() - Duration::minutes(30);
    let expired =
        insert_order_at(api.db(), &merchant, "A-1", money("10.00"), created_at, Duration::minutes(10)).await;
    // Keeps the lane fetching from `created_at` onwards
    insert_order_at(api.db(), &merchant, "A-2", money("20.00"), created_at, Duration::minutes(60)).await;
    assert_eq!(api.expire_orders(Utc::now()).await.unwrap().len(), 1);

    // Paid inside the window, but only seen now
    let source = Arc::new(ScriptedBillSource::new());
    source.push_bill(merchant.id, BillRecord::new(money("10.00"), created_at + Duration::minutes(5), "alice"));
    let mut lane = lane_for(&api, merchant.id, source.clone()).await;
    let report = lane.poll_once().await.unwrap();
    assert!(report.paid.is_empty());
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.late, vec![expired.trade_no.clone()]);
    assert_eq!(api.order_status(&expired.trade_no).await.unwrap().status, OrderStatusType::Timeout);
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn inspected_bills_are_forgotten_once_out_of_range() {
    let api = Arc::new(setup().await);
    let merchant = add_merchant(api.db(), "coffee").await;
    let created_at = Utc::now() - Duration::minutes(10);
    let first = insert_order_at(api.db(), &merchant, "A-1", money("10.00"), created_at, Duration::minutes(30)).await;
    let source = Arc::new(ScriptedBillSource::new());
    source.push_bill(merchant.id, BillRecord::new(money("3.33"), created_at + Duration::minutes(1), "bob"));
    let mut lane = lane_for(&api, merchant.id, source.clone()).await;
    let report = lane.poll_once().await.unwrap();
    assert_eq!(report.unmatched, 1);
    assert_eq!(lane.inspected_unmatched(), 1);

    source.push_bill(merchant.id, BillRecord::new(money("10.00"), created_at + Duration::minutes(2), "alice"));
    let report = lane.poll_once().await.unwrap();
    assert_eq!(report.paid, vec![first.trade_no.clone()]);
    assert_eq!(lane.inspected_unmatched(), 1);

    // The oldest pending order is now younger than the stray bill
    insert_order_at(api.db(), &merchant, "A-2", money("20.00"), Utc::now(), Duration::minutes(30)).await;
    let report = lane.poll_once().await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(lane.inspected_unmatched(), 0);
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn a_failing_bill_source_only_slows_its_own_lane() {
    let api = Arc::new(setup().await);
    let broken = add_merchant(api.db(), "broken").await;
    let healthy = add_merchant(api.db(), "healthy").await;
    let stuck = api.create_order(&order_request(&broken, "B-1", "5.00")).await.unwrap();
    let ok = api.create_order(&order_request(&healthy, "H-1", "5.00")).await.unwrap();

    let source = Arc::new(ScriptedBillSource::new());
    source.push_failure(broken.id, BillSourceError::Unavailable("503".into()));
    source.push_failure(broken.id, BillSourceError::Unavailable("503".into()));
    source.push_failure(broken.id, BillSourceError::Unavailable("503".into()));
    source.push_bill(broken.id, BillRecord::new(money("5.00"), Utc::now(), "carol"));
    source.push_bill(healthy.id, BillRecord::new(money("5.00"), Utc::now(), "dave"));

    let mut broken_lane = lane_for(&api, broken.id, source.clone()).await;
    let mut healthy_lane = lane_for(&api, healthy.id, source.clone()).await;

    let err = broken_lane.poll_once().await.unwrap_err();
    assert!(matches!(err, LaneError::BillSource(BillSourceError::Unavailable(_))));
    assert_eq!(broken_lane.state(), LaneState::Backoff { failures: 1 });
    assert_eq!(broken_lane.next_delay(), StdDuration::from_millis(10));
    broken_lane.poll_once().await.unwrap_err();
    assert_eq!(broken_lane.next_delay(), StdDuration::from_millis(20));

    let report = healthy_lane.poll_once().await.unwrap();
    assert_eq!(report.paid, vec![ok.trade_no.clone()]);
    assert_eq!(healthy_lane.state(), LaneState::Idle);

    broken_lane.poll_once().await.unwrap_err();
    assert_eq!(broken_lane.state(), LaneState::Backoff { failures: 3 });
    assert_eq!(broken_lane.next_delay(), StdDuration::from_millis(40));
    let report = broken_lane.poll_once().await.unwrap();
    assert_eq!(report.paid, vec![stuck.trade_no.clone()]);
    assert_eq!(broken_lane.state(), LaneState::Idle);
    assert_eq!(broken_lane.next_delay(), StdDuration::from_millis(10));
    assert_eq!(source.calls(broken.id), 4);
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn slow_bill_sources_time_out() {
    let api = Arc::new(setup().await);
    let merchant = add_merchant(api.db(), "coffee").await;
    api.create_order(&order_request(&merchant, "A-1", "10.00")).await.unwrap();
    let mut lane = lane_for(&api, merchant.id, Arc::new(HangingBillSource)).await;
    let err = lane.poll_once().await.unwrap_err();
    assert!(matches!(err, LaneError::BillSource(BillSourceError::Timeout(_))), "{err:?}");
    assert_eq!(lane.state(), LaneState::Backoff { failures: 1 });
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn lane_finishes_when_nothing_is_pending() {
    let api = Arc::new(setup().await);
    let merchant = add_merchant(api.db(), "coffee").await;
    let order = api.create_order(&order_request(&merchant, "A-1", "12.34")).await.unwrap();
    let source = Arc::new(ScriptedBillSource::new());
    source.push_bill(merchant.id, BillRecord::new(money("12.34"), Utc::now(), "erin"));
    let lane = lane_for(&api, merchant.id, source).await;
    tokio::time::timeout(StdDuration::from_secs(5), lane.run()).await.expect("The lane should drain and stop");
    assert_eq!(api.order_status(&order.trade_no).await.unwrap().status, OrderStatusType::Paid);
    let pollable = api.db().fetch_pollable_merchants().await.unwrap();
    assert!(pollable.is_empty());
    tear_down(api.db().clone()).await;
}
