use chrono::{DateTime, Utc};

use crate::{
    db_types::{CallbackAttempt, CallbackJob, NewCallbackAttempt},
    traits::{
        data_objects::{AttemptRecorded, CallbackJobUpdate},
        PaymentGatewayError,
    },
};

/// Storage for merchant notifications.
///
/// A [`CallbackJob`] is the persisted retry timer of one order. Jobs move `Queued` → `InFlight` → one of
/// `Queued` (retry), `Delivered` or `Failed`. Every attempt is appended to the callback log, which is never edited.
#[allow(async_fn_in_trait)]
pub trait CallbackManagement {
    async fn fetch_callback_job(&self, order_id: i64) -> Result<Option<CallbackJob>, PaymentGatewayError>;

    /// Queued jobs whose next attempt is due at `now`, earliest first.
    async fn fetch_due_callback_jobs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CallbackJob>, PaymentGatewayError>;

    /// Moves a queued job to `InFlight`, provided it still has the same generation. Returns `None` if another worker
    /// got there first or the job was superseded.
    async fn claim_callback_job(&self, job: &CallbackJob) -> Result<Option<CallbackJob>, PaymentGatewayError>;

    /// Appends `attempt` to the callback log and, if `job` is still the current in-flight generation, applies
    /// `update` to the job and mirrors it onto the order's notification status.
    async fn record_callback_attempt(
        &self,
        job: &CallbackJob,
        attempt: NewCallbackAttempt,
        update: CallbackJobUpdate,
    ) -> Result<AttemptRecorded, PaymentGatewayError>;

    /// Starts a new delivery sequence for the order: bumps the generation, resets the attempt counter and queues the
    /// first attempt for `due_at`.
    async fn restart_callback_job(
        &self,
        order_id: i64,
        due_at: DateTime<Utc>,
    ) -> Result<CallbackJob, PaymentGatewayError>;

    /// Puts jobs that were `InFlight` when the process stopped back in the queue. Returns how many were requeued.
    async fn requeue_in_flight_callback_jobs(&self) -> Result<u64, PaymentGatewayError>;

    /// The callback log of an order, in sequence order.
    async fn fetch_callback_attempts(&self, order_id: i64) -> Result<Vec<CallbackAttempt>, PaymentGatewayError>;
}
