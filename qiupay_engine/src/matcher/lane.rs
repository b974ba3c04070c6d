use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;
use thiserror::Error;

use crate::{
    db_types::{Merchant, OrderStatusType, TradeNo},
    matcher::bill_matcher::{find_match, MatchDecision},
    qpe_api::{errors::OrderFlowError, order_flow_api::OrderFlowApi},
    traits::{BillCredential, BillRecord, BillSource, BillSourceError, PaymentGatewayDatabase, TransitionOutcome},
};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between two polling cycles of a healthy lane
    pub interval: Duration,
    /// Upper bound on the backoff delay of a failing lane
    pub max_backoff: Duration,
    /// How long a single bill-source call may take
    pub fetch_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(5), max_backoff: Duration::from_secs(300), fetch_timeout: Duration::from_secs(10) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    Idle,
    Polling,
    Backoff { failures: u32 },
}

/// The delay before the next cycle of a lane that has failed `failures` times in a row:
/// `interval * 2^(failures - 1)`, capped at `max`. A healthy lane waits one `interval`.
pub fn backoff_delay(interval: Duration, max: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return interval;
    }
    let factor = 2u32.checked_pow(failures - 1).unwrap_or(u32::MAX);
    interval.checked_mul(factor).unwrap_or(max).min(max)
}

/// What one polling cycle saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub paid: Vec<TradeNo>,
    /// Bills that already paid an order in an earlier cycle
    pub already_consumed: usize,
    pub unmatched: usize,
    /// Orders that a bill would have paid, had they not timed out first
    pub late: Vec<TradeNo>,
    /// The merchant had no pending orders, so nothing was fetched
    pub drained: bool,
}

#[derive(Debug, Clone, Error)]
pub enum LaneError {
    #[error("{0}")]
    BillSource(#[from] BillSourceError),
    #[error("{0}")]
    OrderFlow(#[from] OrderFlowError),
}

/// The polling lane of a single merchant.
///
/// A lane keeps its own state and failure count. Nothing that happens in one lane (a slow or broken bill source,
/// a database hiccup) affects any other lane.
pub struct MerchantLane<B> {
    merchant_id: i64,
    credential: BillCredential,
    api: Arc<OrderFlowApi<B>>,
    source: Arc<dyn BillSource>,
    config: PollerConfig,
    state: LaneState,
    failures: u32,
    /// Keys of unmatched bills already checked for late payments, with the time each bill was observed
    inspected_unmatched: HashMap<String, DateTime<Utc>>,
}

impl<B> MerchantLane<B>
where B: PaymentGatewayDatabase
{
    /// Returns `None` if the merchant has no bill-source credential.
    pub fn new(
        merchant: &Merchant,
        api: Arc<OrderFlowApi<B>>,
        source: Arc<dyn BillSource>,
        config: PollerConfig,
    ) -> Option<Self> {
        let credential = merchant.bill_credential.as_ref().filter(|c| !c.is_empty())?;
        Some(Self {
            merchant_id: merchant.id,
            credential: BillCredential::new(merchant.id, credential.clone()),
            api,
            source,
            config,
            state: LaneState::Idle,
            failures: 0,
            inspected_unmatched: HashMap::new(),
        })
    }

    pub fn merchant_id(&self) -> i64 {
        self.merchant_id
    }

    pub fn state(&self) -> LaneState {
        self.state
    }

    /// The number of unmatched bills this lane still remembers having inspected.
    pub fn inspected_unmatched(&self) -> usize {
        self.inspected_unmatched.len()
    }

    pub fn next_delay(&self) -> Duration {
        backoff_delay(self.config.interval, self.config.max_backoff, self.failures)
    }

    /// Polls until the merchant has no pending orders left.
    pub async fn run(mut self) {
        info!("🔍️ Polling lane for merchant #{} started", self.merchant_id);
        loop {
            if let Ok(CycleReport { drained: true, .. }) = self.poll_once().await {
                break;
            }
            tokio::time::sleep(self.next_delay()).await;
        }
        info!("🔍️ Merchant #{} has no pending orders. Polling lane finished.", self.merchant_id);
    }

    /// Runs one polling cycle and updates the lane's state. Errors are returned for inspection, but are never fatal:
    /// they only push the lane into backoff.
    pub async fn poll_once(&mut self) -> Result<CycleReport, LaneError> {
        self.state = LaneState::Polling;
        let result = self.cycle().await;
        match &result {
            Ok(report) => {
                if self.failures > 0 {
                    info!("🔍️ Merchant #{} recovered after {} failed cycles", self.merchant_id, self.failures);
                }
                self.failures = 0;
                self.state = LaneState::Idle;
                if !report.paid.is_empty() {
                    debug!("🔍️ Merchant #{} cycle: {report:?}", self.merchant_id);
                }
            },
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                self.state = LaneState::Backoff { failures: self.failures };
                warn!(
                    "🔍️ Polling merchant #{} failed ({} in a row): {e}. Next attempt in {:?}",
                    self.merchant_id,
                    self.failures,
                    self.next_delay()
                );
            },
        }
        result
    }

    async fn cycle(&mut self) -> Result<CycleReport, LaneError> {
        let mut report = CycleReport::default();
        let mut open = self.api.db().fetch_pending_orders(self.merchant_id).await.map_err(OrderFlowError::from)?;
        let Some(since) = open.iter().map(|o| o.created_at).min() else {
            report.drained = true;
            return Ok(report);
        };
        // Bills observed before `since` are never fetched again
        self.inspected_unmatched.retain(|_, observed_at| *observed_at >= since);
        let fetch = self.source.fetch_bills(&self.credential, since);
        let mut bills = match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
            Ok(bills) => bills?,
            Err(_) => return Err(BillSourceError::Timeout(self.config.fetch_timeout.as_secs()).into()),
        };
        report.fetched = bills.len();
        trace!("🔍️ {} bills fetched for merchant #{} since {since}", bills.len(), self.merchant_id);
        bills.sort_by_key(|b| b.observed_at);
        let mut consumed = self
            .api
            .db()
            .fetch_consumed_bill_keys(self.merchant_id, since)
            .await
            .map_err(OrderFlowError::from)?
            .into_iter()
            .collect::<HashSet<_>>();

        for bill in bills {
            let key = bill.key();
            if consumed.contains(&key) {
                report.already_consumed += 1;
                continue;
            }
            let decision = find_match(&bill, &open);
            if let MatchDecision::Ambiguous { chosen, candidates } = &decision {
                warn!(
                    "🔍️ Inconsistent pending set for merchant #{}: {candidates} pending orders expect {}. Choosing the \
                     earliest, [{}]",
                    self.merchant_id, bill.amount, chosen.trade_no
                );
            }
            let Some(order) = decision.order().cloned() else {
                report.unmatched += 1;
                self.check_for_late_payment(&bill, &key, &mut report).await?;
                continue;
            };
            match self.api.confirm_match(&order, &bill).await {
                Ok(TransitionOutcome::Committed(paid)) => {
                    report.paid.push(paid.order.trade_no);
                    consumed.insert(key);
                },
                Ok(TransitionOutcome::Conflict { .. }) => {},
                Err(OrderFlowError::BillAlreadyConsumed(key)) => {
                    debug!("🔍️ Bill {key} was consumed concurrently. Skipping it.");
                },
                Err(e) => return Err(e.into()),
            }
            open.retain(|o| o.id != order.id);
        }
        Ok(report)
    }

    /// Logs, once per bill, a transfer that would have paid an order that already timed out. This includes transfers made
    /// inside the order's window that were only seen after the expiry sweep. Such orders are never revived.
    async fn check_for_late_payment(
        &mut self,
        bill: &BillRecord,
        key: &str,
        report: &mut CycleReport,
    ) -> Result<(), LaneError> {
        if self.inspected_unmatched.insert(key.to_string(), bill.observed_at).is_some() {
            return Ok(());
        }
        let timed_out = self
            .api
            .db()
            .fetch_closed_orders_with_amount(self.merchant_id, bill.amount, OrderStatusType::Timeout)
            .await
            .map_err(OrderFlowError::from)?;
        let late = timed_out.into_iter().filter(|o| o.created_at <= bill.observed_at);
        for order in late {
            warn!(
                "🔍️ Transfer of {} observed at {} matches order [{}], which timed out at {}. The order will not be \
                 recovered automatically.",
                bill.amount, bill.observed_at, order.trade_no, order.expires_at
            );
            report.late.push(order.trade_no);
        }
        Ok(())
    }
}
