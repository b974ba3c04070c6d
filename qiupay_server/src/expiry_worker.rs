use std::time::Duration;

use chrono::Utc;
use log::*;
use qiupay_engine::{db_types::Order, OrderFlowApi, SqliteDatabase};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

pub const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `period`, pending orders whose payment window has closed are moved to `Timeout`, which frees their amounts.
pub fn start_expiry_worker(api: std::sync::Arc<OrderFlowApi<SqliteDatabase>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🕰️ Order expiry worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running order expiry job");
            match api.expire_orders(Utc::now()).await {
                Ok(expired) if expired.is_empty() => {},
                Ok(expired) => {
                    info!("🕰️ {} orders expired", expired.len());
                    debug!("🕰️ Expired orders: {}", order_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running order expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] merchant: {} amount: {}", o.trade_no, o.merchant_id, o.amount))
        .collect::<Vec<String>>()
        .join(", ")
}
