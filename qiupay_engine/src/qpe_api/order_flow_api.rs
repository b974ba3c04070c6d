use std::{collections::HashMap, fmt::Debug};

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use log::*;

use crate::{
    allocator::AmountAllocator,
    callbacks::{build_return_url, RetrySchedule},
    db_types::{Merchant, NewOrder, Order, OrderStatusType, TradeNo},
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    helpers::{generate_trade_no, verify_params},
    qpe_api::{
        errors::OrderFlowError,
        order_objects::{MerchantInfo, NewOrderRequest, OrderCreated, OrderLookup},
    },
    traits::{BillRecord, PaidOrder, PaidTransition, PaymentGatewayDatabase, TransitionOutcome},
};

pub const DEFAULT_ORDER_TIMEOUT_MINUTES: i64 = 10;

/// `OrderFlowApi` is the primary API for the order lifecycle.
///
/// It is the only writer of order state. Orders are created here, and every exit from `Pending` (paid, timeout or
/// canceled) goes through one of its methods, which all share the same atomic conditional transition in the store.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    order_timeout: Duration,
    schedule: RetrySchedule,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi (timeout: {})", self.order_timeout)
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self {
            db,
            producers,
            order_timeout: Duration::minutes(DEFAULT_ORDER_TIMEOUT_MINUTES),
            schedule: RetrySchedule::default(),
        }
    }

    /// How long an order stays payable after it is created
    pub fn with_order_timeout(mut self, timeout: Duration) -> Self {
        self.order_timeout = timeout;
        self
    }

    /// The callback schedule used to time the first notification attempt of a paid order
    pub fn with_retry_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentGatewayDatabase
{
    /// Creates an order from the merchant's raw request parameters.
    ///
    /// The request is validated and its signature checked against the merchant key before anything is written. The
    /// final amount is allocated so that no two pending orders of the merchant share it.
    pub async fn create_order(&self, params: &HashMap<String, String>) -> Result<OrderCreated, OrderFlowError> {
        let request = NewOrderRequest::from_params(params)?;
        let merchant = self.fetch_merchant(request.pid).await?;
        verify_params(params, &merchant.secret_key, &request.sign).map_err(|e| {
            warn!("🧾️ Order request from merchant #{} failed its signature check", merchant.id);
            OrderFlowError::from(e)
        })?;
        if !merchant.active {
            return Err(OrderFlowError::MerchantDisabled(merchant.id));
        }
        if !merchant.has_bill_source() {
            return Err(OrderFlowError::BillSourceNotConfigured(merchant.id));
        }
        if self.db.fetch_order_by_out_trade_no(merchant.id, &request.out_trade_no).await?.is_some() {
            return Err(OrderFlowError::DuplicateOrder(request.out_trade_no));
        }
        let now = Utc::now();
        let new_order = NewOrder {
            trade_no: generate_trade_no(now),
            out_trade_no: request.out_trade_no,
            merchant_id: merchant.id,
            pay_type: request.pay_type,
            name: request.name,
            requested_amount: request.money,
            amount: request.money,
            notify_url: request.notify_url,
            return_url: request.return_url,
            param: request.param,
            client_ip: request.client_ip,
            device: request.device,
            created_at: now,
            expires_at: now + self.order_timeout,
        };
        let order = AmountAllocator::new(self.db.clone()).allocate_and_insert(new_order).await?;
        info!(
            "🧾️ Order [{}] created for merchant #{} ({}). Payer must transfer {}",
            order.trade_no, merchant.id, order.out_trade_no, order.amount
        );
        Ok(OrderCreated {
            trade_no: order.trade_no.clone(),
            money: order.amount,
            qrcode: merchant.payment_code_url.clone(),
            order,
        })
    }

    /// Merchant-authenticated order lookup. `key` must be the merchant's secret key.
    pub async fn query_order(&self, pid: i64, key: &str, lookup: OrderLookup) -> Result<Order, OrderFlowError> {
        let merchant = self.authenticate(pid, key).await?;
        let order = match &lookup {
            OrderLookup::TradeNo(trade_no) => {
                self.db.fetch_order_by_trade_no(trade_no).await?.filter(|o| o.merchant_id == merchant.id)
            },
            OrderLookup::OutTradeNo(out_trade_no) => {
                self.db.fetch_order_by_out_trade_no(merchant.id, out_trade_no).await?
            },
        };
        order.ok_or_else(|| {
            let id = match lookup {
                OrderLookup::TradeNo(t) => t.to_string(),
                OrderLookup::OutTradeNo(o) => o,
            };
            OrderFlowError::OrderNotFound(id)
        })
    }

    /// Merchant-authenticated account summary: status, balance and order counts. Days are UTC days.
    pub async fn merchant_info(&self, pid: i64, key: &str) -> Result<MerchantInfo, OrderFlowError> {
        let merchant = self.authenticate(pid, key).await?;
        let today = Utc.from_utc_datetime(&Utc::now().date_naive().and_time(NaiveTime::MIN));
        let orders = self.db.count_orders(merchant.id, today).await?;
        trace!("🧾️ Merchant #{pid} account query: balance {}, {orders:?}", merchant.balance);
        Ok(MerchantInfo { merchant, orders })
    }

    /// Unauthenticated lookup by trade number, used by the payment page.
    pub async fn order_status(&self, trade_no: &TradeNo) -> Result<Order, OrderFlowError> {
        self.db
            .fetch_order_by_trade_no(trade_no)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(trade_no.to_string()))
    }

    /// The browser redirect for a paid order, if the merchant supplied a return URL.
    pub async fn return_url(&self, order: &Order) -> Result<Option<String>, OrderFlowError> {
        if order.status != OrderStatusType::Paid {
            return Ok(None);
        }
        let merchant = self.fetch_merchant(order.merchant_id).await?;
        Ok(build_return_url(order, &merchant))
    }

    /// Commits the pending → paid transition for `order`, caused by `bill`.
    ///
    /// If the order has already left `Pending` (it was paid by another bill, timed out or was canceled), nothing
    /// changes and `Conflict` is returned.
    pub async fn confirm_match(
        &self,
        order: &Order,
        bill: &BillRecord,
    ) -> Result<TransitionOutcome<PaidOrder>, OrderFlowError> {
        let paid_at = Utc::now();
        let transition = PaidTransition {
            order_id: order.id,
            bill: bill.clone(),
            paid_at,
            callback_due_at: self.schedule.first_attempt_at(paid_at),
        };
        let outcome = self.db.mark_order_paid(transition).await?;
        match &outcome {
            TransitionOutcome::Committed(paid) => {
                info!(
                    "🧾️ Order [{}] is paid. {} received from '{}' at {}",
                    paid.order.trade_no, bill.amount, bill.counterparty, bill.observed_at
                );
                self.producers.publish_order_paid(OrderPaidEvent::new(paid.order.clone(), paid.matched.clone())).await;
            },
            TransitionOutcome::Conflict { current } => {
                debug!("🧾️ Order [{}] could not be marked as paid. It is already {current}", order.trade_no);
            },
        }
        Ok(outcome)
    }

    /// Administrative cancellation of a pending order.
    pub async fn cancel_order(&self, trade_no: &TradeNo) -> Result<TransitionOutcome, OrderFlowError> {
        let order = self.order_status(trade_no).await?;
        let outcome = self.db.close_order(order.id, OrderStatusType::Canceled, Utc::now()).await?;
        match &outcome {
            TransitionOutcome::Committed(order) => {
                info!("🧾️ Order [{}] has been canceled. {} is free again", order.trade_no, order.amount);
                self.producers.publish_order_annulled(OrderAnnulledEvent::new(order.clone())).await;
            },
            TransitionOutcome::Conflict { current } => {
                debug!("🧾️ Order [{trade_no}] cannot be canceled. It is already {current}");
            },
        }
        Ok(outcome)
    }

    /// Moves every pending order that expired before `now` to `Timeout`.
    pub async fn expire_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, OrderFlowError> {
        let expired = self.db.expire_orders(now).await?;
        for order in &expired {
            debug!("🧾️ Order [{}] timed out unpaid. {} is free again", order.trade_no, order.amount);
            self.producers.publish_order_annulled(OrderAnnulledEvent::new(order.clone())).await;
        }
        Ok(expired)
    }

    async fn authenticate(&self, pid: i64, key: &str) -> Result<Merchant, OrderFlowError> {
        let merchant = self.fetch_merchant(pid).await?;
        if merchant.secret_key != key {
            return Err(OrderFlowError::InvalidMerchantKey);
        }
        Ok(merchant)
    }

    async fn fetch_merchant(&self, merchant_id: i64) -> Result<Merchant, OrderFlowError> {
        self.db
            .fetch_merchant(merchant_id)
            .await?
            .ok_or_else(|| OrderFlowError::MerchantNotFound(merchant_id.to_string()))
    }
}
