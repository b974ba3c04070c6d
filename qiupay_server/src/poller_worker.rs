//! Supervises the per-merchant polling lanes.
//!
//! Each merchant with pending orders gets its own [`MerchantLane`] on its own task. A lane runs until its merchant has
//! no pending orders left, so the supervisor only has to look for merchants that have pending orders but no live
//! lane, once per polling interval.
use std::{collections::HashMap, sync::Arc};

use log::*;
use qiupay_engine::{
    matcher::{MerchantLane, PollerConfig},
    traits::BillSource,
    MerchantManagement,
    OrderFlowApi,
    SqliteDatabase,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

/// Starts the poller supervisor. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_poller_worker(
    api: Arc<OrderFlowApi<SqliteDatabase>>,
    source: Arc<dyn BillSource>,
    config: PollerConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lanes = HashMap::<i64, JoinHandle<()>>::new();
        let mut timer = tokio::time::interval(config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🔍️ Bill poller started. Interval: {:?}, max backoff: {:?}", config.interval, config.max_backoff);
        loop {
            timer.tick().await;
            reap_finished_lanes(&mut lanes);
            let merchants = match api.db().fetch_pollable_merchants().await {
                Ok(m) => m,
                Err(e) => {
                    error!("🔍️ Could not fetch the merchants to poll: {e}");
                    continue;
                },
            };
            for merchant in merchants {
                if lanes.contains_key(&merchant.id) {
                    continue;
                }
                let Some(lane) = MerchantLane::new(&merchant, Arc::clone(&api), Arc::clone(&source), config.clone())
                else {
                    warn!("🔍️ Merchant #{} has pending orders but no bill-source credential", merchant.id);
                    continue;
                };
                debug!("🔍️ Spawning polling lane for merchant #{}", merchant.id);
                lanes.insert(merchant.id, tokio::spawn(lane.run()));
            }
        }
    })
}

fn reap_finished_lanes(lanes: &mut HashMap<i64, JoinHandle<()>>) {
    lanes.retain(|merchant_id, handle| {
        if !handle.is_finished() {
            return true;
        }
        trace!("🔍️ Lane for merchant #{merchant_id} has finished");
        false
    });
}
