//! `SqliteDatabase` is a concrete implementation of a payment confirmation engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use qpg_common::Money;
use sqlx::{migrate, SqlitePool};

use super::db::{callbacks, db_url, matches, merchants, new_pool, orders};
use crate::{
    db_types::{
        CallbackAttempt,
        CallbackJob,
        MatchEvent,
        Merchant,
        NewCallbackAttempt,
        NewMerchant,
        NewOrder,
        NotifyStatus,
        Order,
        OrderCounts,
        OrderStatusType,
        TradeNo,
    },
    traits::{
        AttemptRecorded,
        CallbackJobUpdate,
        CallbackManagement,
        MerchantManagement,
        PaidOrder,
        PaidTransition,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        TransitionOutcome,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order_by_id(&self, order_id: i64) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_trade_no(&self, trade_no: &TradeNo) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_trade_no(trade_no, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_out_trade_no(
        &self,
        merchant_id: i64,
        out_trade_no: &str,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_out_trade_no(merchant_id, out_trade_no, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_pending_orders(&self, merchant_id: i64) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_pending_orders(merchant_id, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_pending_amounts(
        &self,
        merchant_id: i64,
        from: Money,
        to: Money,
    ) -> Result<Vec<Money>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let amounts = orders::fetch_pending_amounts(merchant_id, from, to, &mut conn).await?;
        Ok(amounts)
    }

    async fn count_orders(&self, merchant_id: i64, today: DateTime<Utc>) -> Result<OrderCounts, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let counts = orders::count_orders(merchant_id, today, &mut conn).await?;
        Ok(counts)
    }

    async fn fetch_closed_orders_with_amount(
        &self,
        merchant_id: i64,
        amount: Money,
        status: OrderStatusType,
    ) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_closed_orders_with_amount(merchant_id, amount, status, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_consumed_bill_keys(
        &self,
        merchant_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let keys = matches::fetch_consumed_bill_keys(merchant_id, since, &mut conn).await?;
        Ok(keys)
    }

    async fn fetch_match_event(&self, order_id: i64) -> Result<Option<MatchEvent>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let event = matches::fetch_match_event(order_id, &mut conn).await?;
        Ok(event)
    }

    /// Dropping the transaction without committing rolls every statement back, so each early return below leaves the
    /// database untouched.
    async fn mark_order_paid(
        &self,
        transition: PaidTransition,
    ) -> Result<TransitionOutcome<PaidOrder>, PaymentGatewayError> {
        let PaidTransition { order_id, bill, paid_at, callback_due_at } = transition;
        let mut tx = self.pool.begin().await?;
        let Some(order) = orders::mark_paid(order_id, paid_at, &mut tx).await? else {
            let current = orders::fetch_order_status(order_id, &mut tx)
                .await?
                .ok_or_else(|| PaymentGatewayError::OrderNotFound(format!("id {order_id}")))?;
            return Ok(TransitionOutcome::Conflict { current });
        };
        let matched = matches::insert_match_event(order.id, order.merchant_id, &bill, paid_at, &mut tx).await?;
        merchants::add_to_balance(order.merchant_id, order.amount, paid_at, &mut tx).await?;
        let job = callbacks::upsert_job(order.id, callback_due_at, paid_at, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Order [{}] marked as paid by bill {}. {} credited to merchant #{}",
            order.trade_no, matched.bill_key, order.amount, order.merchant_id
        );
        Ok(TransitionOutcome::Committed(PaidOrder { order, matched, job }))
    }

    async fn close_order(
        &self,
        order_id: i64,
        status: OrderStatusType,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, PaymentGatewayError> {
        if !matches!(status, OrderStatusType::Canceled | OrderStatusType::Timeout) {
            return Err(PaymentGatewayError::InvalidClosingStatus(order_id, status));
        }
        let mut tx = self.pool.begin().await?;
        let outcome = match orders::mark_closed(order_id, status, now, &mut tx).await? {
            Some(order) => TransitionOutcome::Committed(order),
            None => {
                let current = orders::fetch_order_status(order_id, &mut tx)
                    .await?
                    .ok_or_else(|| PaymentGatewayError::OrderNotFound(format!("id {order_id}")))?;
                TransitionOutcome::Conflict { current }
            },
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn expire_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let expired = orders::expire_orders(now, &mut tx).await?;
        tx.commit().await?;
        if !expired.is_empty() {
            debug!("🗃️ {} orders moved to Timeout", expired.len());
        }
        Ok(expired)
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl MerchantManagement for SqliteDatabase {
    async fn insert_merchant(&self, merchant: NewMerchant) -> Result<Merchant, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let merchant = merchants::insert_merchant(merchant, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(merchant)
    }

    async fn fetch_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let merchant = merchants::fetch_merchant(merchant_id, &mut conn).await?;
        Ok(merchant)
    }

    async fn set_merchant_active(&self, merchant_id: i64, active: bool) -> Result<Merchant, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let merchant = merchants::set_active(merchant_id, active, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(merchant)
    }

    async fn update_bill_credential(
        &self,
        merchant_id: i64,
        credential: Option<String>,
    ) -> Result<Merchant, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let merchant = merchants::update_bill_credential(merchant_id, credential, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(merchant)
    }

    async fn fetch_pollable_merchants(&self) -> Result<Vec<Merchant>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let merchants = merchants::fetch_pollable_merchants(&mut conn).await?;
        Ok(merchants)
    }
}

impl CallbackManagement for SqliteDatabase {
    async fn fetch_callback_job(&self, order_id: i64) -> Result<Option<CallbackJob>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let job = callbacks::fetch_job(order_id, &mut conn).await?;
        Ok(job)
    }

    async fn fetch_due_callback_jobs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CallbackJob>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let jobs = callbacks::fetch_due_jobs(now, limit, &mut conn).await?;
        Ok(jobs)
    }

    async fn claim_callback_job(&self, job: &CallbackJob) -> Result<Option<CallbackJob>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let claimed = callbacks::claim_job(job, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(claimed)
    }

    async fn record_callback_attempt(
        &self,
        job: &CallbackJob,
        attempt: NewCallbackAttempt,
        update: CallbackJobUpdate,
    ) -> Result<AttemptRecorded, PaymentGatewayError> {
        let now = attempt.created_at;
        let mut tx = self.pool.begin().await?;
        let logged = callbacks::insert_attempt(attempt, &mut tx).await?;
        trace!("🗃️ Callback attempt #{} logged for order {}", logged.seq, logged.order_id);
        let result = match callbacks::advance_job(job, update, now, &mut tx).await? {
            Some(advanced) => {
                let status = match update {
                    CallbackJobUpdate::Delivered => NotifyStatus::Delivered,
                    CallbackJobUpdate::Failed => NotifyStatus::Failed,
                    CallbackJobUpdate::RetryAt(_) => NotifyStatus::Pending,
                };
                orders::update_notify_status(advanced.order_id, status, advanced.attempts_made, now, &mut tx).await?;
                AttemptRecorded::Applied(advanced)
            },
            None => AttemptRecorded::Superseded,
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn restart_callback_job(
        &self,
        order_id: i64,
        due_at: DateTime<Utc>,
    ) -> Result<CallbackJob, PaymentGatewayError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let job = callbacks::upsert_job(order_id, due_at, now, &mut tx).await?;
        orders::update_notify_status(order_id, NotifyStatus::Pending, 0, now, &mut tx).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn requeue_in_flight_callback_jobs(&self) -> Result<u64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let count = callbacks::requeue_in_flight(Utc::now(), &mut conn).await?;
        Ok(count)
    }

    async fn fetch_callback_attempts(&self, order_id: i64) -> Result<Vec<CallbackAttempt>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let attempts = callbacks::fetch_attempts(order_id, &mut conn).await?;
        Ok(attempts)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date with the migrations embedded in this crate.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
