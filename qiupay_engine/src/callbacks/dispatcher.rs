use std::{fmt::Debug, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use log::*;

use crate::{
    callbacks::{payload::notification_params, schedule::RetrySchedule},
    db_types::{CallbackJob, NewCallbackAttempt, OrderStatusType, TradeNo},
    qpe_api::errors::OrderFlowError,
    traits::{
        AttemptRecorded,
        CallbackJobUpdate,
        CallbackRequest,
        DeliveryFailure,
        Notifier,
        PaymentGatewayDatabase,
        PaymentGatewayError,
    },
};

pub const DEFAULT_BATCH_SIZE: i64 = 50;
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened to one job during a dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub order_id: i64,
    pub generation: i64,
    pub attempt: i64,
    pub update: CallbackJobUpdate,
    /// False if a re-notify replaced this job's sequence while the attempt was in flight.
    pub applied: bool,
}

/// Delivers paid-order notifications to merchants.
///
/// The dispatcher holds no timers of its own. Every job carries its `next_attempt_at`, and each call to
/// [`Self::dispatch_due`] claims the jobs that have fallen due, delivers them concurrently and writes the outcome of
/// every attempt back to the store.
pub struct CallbackDispatcher<B> {
    db: B,
    notifier: Arc<dyn Notifier>,
    schedule: RetrySchedule,
    batch_size: i64,
    /// Upper bound on a single attempt. An attempt that runs longer counts as a failed delivery.
    notify_timeout: Duration,
}

impl<B> Debug for CallbackDispatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallbackDispatcher ({:?})", self.schedule)
    }
}

impl<B> CallbackDispatcher<B> {
    pub fn new(db: B, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            notifier,
            schedule: RetrySchedule::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn schedule(&self) -> &RetrySchedule {
        &self.schedule
    }
}

impl<B> CallbackDispatcher<B>
where B: PaymentGatewayDatabase
{
    /// Puts jobs that were in flight when the process last stopped back in the queue. Call once at startup, before the
    /// first dispatch pass.
    pub async fn recover(&self) -> Result<u64, PaymentGatewayError> {
        let count = self.db.requeue_in_flight_callback_jobs().await?;
        if count > 0 {
            info!("📣️ {count} interrupted callback jobs have been requeued");
        }
        Ok(count)
    }

    /// Runs one attempt for every job that is due at `now`.
    ///
    /// A failure to deliver one job never prevents the others from being delivered. Store errors on individual jobs
    /// are logged and the job is left for a later pass.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryReport>, PaymentGatewayError> {
        let due = self.db.fetch_due_callback_jobs(now, self.batch_size).await?;
        if due.is_empty() {
            return Ok(vec![]);
        }
        trace!("📣️ {} callback jobs are due", due.len());
        let results = join_all(due.iter().map(|job| self.run_job(job, now))).await;
        let reports = results
            .into_iter()
            .filter_map(|r| match r {
                Ok(report) => report,
                Err(e) => {
                    error!("📣️ Could not process a callback job: {e}");
                    None
                },
            })
            .collect();
        Ok(reports)
    }

    /// Attempts are logged, and the next attempt scheduled, relative to the pass time `now`.
    async fn run_job(
        &self,
        job: &CallbackJob,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryReport>, PaymentGatewayError> {
        let Some(job) = self.db.claim_callback_job(job).await? else {
            trace!("📣️ Callback job for order {} was claimed elsewhere or superseded", job.order_id);
            return Ok(None);
        };
        let order = self
            .db
            .fetch_order_by_id(job.order_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(format!("id {}", job.order_id)))?;
        let merchant = self
            .db
            .fetch_merchant(order.merchant_id)
            .await?
            .ok_or(PaymentGatewayError::MerchantNotFound(order.merchant_id))?;
        let attempt = job.attempts_made + 1;
        let request = CallbackRequest { url: order.notify_url.clone(), params: notification_params(&order, &merchant) };
        debug!("📣️ Notifying merchant #{} about order [{}] (attempt {attempt})", merchant.id, order.trade_no);
        let delivery = tokio::time::timeout(self.notify_timeout, self.notifier.notify(&request));
        let result = match delivery.await {
            Ok(result) => result,
            Err(_) => Err(DeliveryFailure::Timeout(self.notify_timeout.as_secs())),
        };
        let result = result.and_then(|resp| {
            if resp.is_acknowledged() {
                Ok(resp)
            } else if (200..300).contains(&resp.status) {
                Err(DeliveryFailure::NotAcknowledged { status: resp.status, body: resp.body })
            } else {
                Err(DeliveryFailure::UnexpectedStatus { status: resp.status, body: resp.body })
            }
        });
        let (update, http_status, body, success) = match result {
            Ok(resp) => (CallbackJobUpdate::Delivered, Some(resp.status), resp.body, true),
            Err(failure) => {
                let update = self.schedule.after_failure(attempt, now);
                match update {
                    CallbackJobUpdate::Failed => warn!(
                        "📣️ Notification for order [{}] failed on the last of {attempt} attempts: {failure}. Giving up.",
                        order.trade_no
                    ),
                    _ => info!("📣️ Notification for order [{}] failed on attempt {attempt}: {failure}", order.trade_no),
                }
                (update, failure.http_status(), failure.response_body(), false)
            },
        };
        let log_entry = NewCallbackAttempt {
            order_id: order.id,
            generation: job.generation,
            attempt,
            url: request.url,
            http_status: http_status.map(i64::from),
            response_body: Some(body),
            success,
            created_at: now,
        };
        let applied = match self.db.record_callback_attempt(&job, log_entry, update).await? {
            AttemptRecorded::Applied(_) => true,
            AttemptRecorded::Superseded => {
                info!(
                    "📣️ Attempt {attempt} for order [{}] finished after a re-notify replaced its sequence. Its result \
                     has been logged only.",
                    order.trade_no
                );
                false
            },
        };
        if success && applied {
            info!("📣️ Merchant #{} acknowledged order [{}] on attempt {attempt}", merchant.id, order.trade_no);
        }
        Ok(Some(DeliveryReport { order_id: order.id, generation: job.generation, attempt, update, applied }))
    }

    /// Starts a fresh delivery sequence for a paid order, with a full attempt budget. The first attempt falls due
    /// according to the schedule.
    pub async fn renotify(&self, trade_no: &TradeNo) -> Result<CallbackJob, OrderFlowError> {
        let order = self
            .db
            .fetch_order_by_trade_no(trade_no)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(trade_no.to_string()))?;
        if order.status != OrderStatusType::Paid {
            return Err(OrderFlowError::OrderNotPaid(order.trade_no, order.status));
        }
        let due_at = self.schedule.first_attempt_at(Utc::now());
        let job = self.db.restart_callback_job(order.id, due_at).await?;
        info!("📣️ Re-notify requested for order [{trade_no}]. Generation {} starts at {due_at}", job.generation);
        Ok(job)
    }
}
