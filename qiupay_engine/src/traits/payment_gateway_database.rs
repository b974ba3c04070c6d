use chrono::{DateTime, Utc};
use qpg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{MatchEvent, NewOrder, Order, OrderCounts, OrderStatusType, TradeNo},
    traits::{
        data_objects::{PaidOrder, PaidTransition, TransitionOutcome},
        CallbackManagement,
        MerchantManagement,
    },
};

/// This trait defines the highest level of behaviour for backends supporting the payment confirmation engine.
///
/// This behaviour includes:
/// * Storing new orders, with storage-level protection against two pending orders of one merchant sharing an amount
/// * Querying the pending set that the allocator and the matcher work from
/// * The atomic exit transitions out of `Pending`
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + MerchantManagement + CallbackManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new pending order.
    ///
    /// Fails with
    /// * [`PaymentGatewayError::DuplicateOrder`] if the merchant already has an order with the same `out_trade_no`,
    /// * [`PaymentGatewayError::AmountTaken`] if another pending order of the merchant holds the same amount,
    /// * [`PaymentGatewayError::TradeNoCollision`] if the trade number is already in use.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    async fn fetch_order_by_id(&self, order_id: i64) -> Result<Option<Order>, PaymentGatewayError>;

    async fn fetch_order_by_trade_no(&self, trade_no: &TradeNo) -> Result<Option<Order>, PaymentGatewayError>;

    async fn fetch_order_by_out_trade_no(
        &self,
        merchant_id: i64,
        out_trade_no: &str,
    ) -> Result<Option<Order>, PaymentGatewayError>;

    /// All pending orders of the merchant, oldest first.
    async fn fetch_pending_orders(&self, merchant_id: i64) -> Result<Vec<Order>, PaymentGatewayError>;

    /// The amounts held by the merchant's pending orders that lie in `[from, to]`.
    async fn fetch_pending_amounts(
        &self,
        merchant_id: i64,
        from: Money,
        to: Money,
    ) -> Result<Vec<Money>, PaymentGatewayError>;

    /// The merchant's order counts. `today` is the start of the current day.
    async fn count_orders(&self, merchant_id: i64, today: DateTime<Utc>) -> Result<OrderCounts, PaymentGatewayError>;

    /// Orders of the merchant that closed with `status` and carried exactly `amount`.
    async fn fetch_closed_orders_with_amount(
        &self,
        merchant_id: i64,
        amount: Money,
        status: OrderStatusType,
    ) -> Result<Vec<Order>, PaymentGatewayError>;

    /// Keys of the bills, observed at or after `since`, that have already paid one of the merchant's orders.
    async fn fetch_consumed_bill_keys(
        &self,
        merchant_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, PaymentGatewayError>;

    async fn fetch_match_event(&self, order_id: i64) -> Result<Option<MatchEvent>, PaymentGatewayError>;

    /// In a single atomic transaction:
    /// * moves the order from `Pending` to `Paid` and stamps `paid_at`,
    /// * records the match event for the bill,
    /// * adds the order amount to the merchant balance,
    /// * queues the first callback attempt.
    ///
    /// If the order is no longer pending, nothing is written and `Conflict` is returned. If the bill has already paid
    /// another order, [`PaymentGatewayError::BillAlreadyConsumed`] is returned and nothing is written.
    async fn mark_order_paid(
        &self,
        transition: PaidTransition,
    ) -> Result<TransitionOutcome<PaidOrder>, PaymentGatewayError>;

    /// Moves a pending order to `Canceled` or `Timeout` and stamps `closed_at`.
    async fn close_order(
        &self,
        order_id: i64,
        status: OrderStatusType,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, PaymentGatewayError>;

    /// Moves every pending order whose `expires_at` lies before `now` to `Timeout`. Returns the orders that were
    /// moved.
    async fn expire_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Merchant {0} does not exist")]
    MerchantNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(String),
    #[error("Merchant {merchant_id} already has an order with number {out_trade_no}")]
    DuplicateOrder { merchant_id: i64, out_trade_no: String },
    #[error("Another pending order already holds the amount {0}")]
    AmountTaken(Money),
    #[error("Trade number {0} is already in use")]
    TradeNoCollision(TradeNo),
    #[error("Bill {0} has already paid another order")]
    BillAlreadyConsumed(String),
    #[error("Order {0} cannot move to {1}. Only Canceled and Timeout are valid closing states.")]
    InvalidClosingStatus(i64, OrderStatusType),
    #[error("There is no callback job for order {0}")]
    CallbackJobNotFound(i64),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
