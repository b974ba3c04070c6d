use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::*;
use qiupay_engine::{callbacks::CallbackDispatcher, SqliteDatabase};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

/// Starts the callback worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Jobs left in flight by a previous run are requeued first. After that, due notifications are delivered every
/// `period`.
pub fn start_callback_worker(dispatcher: Arc<CallbackDispatcher<SqliteDatabase>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = dispatcher.recover().await {
            error!("📣️ Could not requeue interrupted callback jobs: {e}");
        }
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("📣️ Callback worker started");
        loop {
            timer.tick().await;
            match dispatcher.dispatch_due(Utc::now()).await {
                Ok(reports) if reports.is_empty() => {},
                Ok(reports) => {
                    let applied = reports.iter().filter(|r| r.applied).count();
                    debug!("📣️ {} notification attempts made, {applied} recorded against a live job", reports.len());
                },
                Err(e) => error!("📣️ Error running the callback dispatcher: {e}"),
            }
        }
    })
}
