//! # Amount allocation
//!
//! Payers are identified purely by how much they transfer, so two pending orders of the same merchant must never
//! expect the same amount. When an order is created, the requested amount is nudged upwards one minor unit at a time
//! (`+0.00`, `+0.01`, ... `+0.99`) until an amount is found that none of the merchant's pending orders holds.
//!
//! The search runs against a snapshot of the pending set, so two concurrent creations can still pick the same
//! amount. The store's unique index over pending amounts rejects the loser, which re-reads the pending set and
//! searches again, for up to [`MAX_ALLOCATION_ROUNDS`] rounds.
use std::collections::HashSet;

use chrono::Utc;
use log::*;
use qpg_common::Money;

use crate::{
    db_types::{NewOrder, Order},
    helpers::generate_trade_no,
    qpe_api::errors::OrderFlowError,
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// Number of candidate amounts tried per round: offsets 0 to 99 minor units.
pub const ALLOCATION_CANDIDATES: i64 = 100;
pub const MAX_ALLOCATION_ROUNDS: usize = 3;
const MAX_TRADE_NO_RETRIES: usize = 5;

/// The inclusive range of amounts the allocator may hand out for `requested`.
pub fn candidate_range(requested: Money) -> Option<(Money, Money)> {
    let last = requested.checked_offset(ALLOCATION_CANDIDATES - 1)?;
    Some((requested, last))
}

/// Picks the smallest free amount in the candidate range of `requested`, given the amounts already `occupied`.
pub fn pick_amount(requested: Money, occupied: &[Money]) -> Option<Money> {
    let occupied = occupied.iter().copied().collect::<HashSet<Money>>();
    (0..ALLOCATION_CANDIDATES).filter_map(|offset| requested.checked_offset(offset)).find(|a| !occupied.contains(a))
}

pub struct AmountAllocator<B> {
    db: B,
}

impl<B> AmountAllocator<B>
where B: PaymentGatewayDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Allocates a final amount for `order` and stores it.
    ///
    /// `order.amount` is ignored and overwritten. A fresh trade number is generated if the one in `order` is already
    /// taken.
    pub async fn allocate_and_insert(&self, mut order: NewOrder) -> Result<Order, OrderFlowError> {
        let requested = order.requested_amount;
        let (from, to) = candidate_range(requested).ok_or(OrderFlowError::AllocationExhausted(requested))?;
        let mut trade_no_retries = 0;
        let mut round = 0;
        while round < MAX_ALLOCATION_ROUNDS {
            let occupied = self.db.fetch_pending_amounts(order.merchant_id, from, to).await?;
            let amount = pick_amount(requested, &occupied).ok_or_else(|| {
                warn!(
                    "🧾️ All {ALLOCATION_CANDIDATES} amounts from {from} to {to} are taken for merchant #{}",
                    order.merchant_id
                );
                OrderFlowError::AllocationExhausted(requested)
            })?;
            order.amount = amount;
            match self.db.insert_order(order.clone()).await {
                Ok(stored) => {
                    if amount != requested {
                        debug!("🧾️ Requested {requested} allocated as {amount} for order [{}]", stored.trade_no);
                    }
                    return Ok(stored);
                },
                Err(PaymentGatewayError::AmountTaken(taken)) => {
                    debug!("🧾️ Amount {taken} was taken by a concurrent order. Searching again.");
                    round += 1;
                },
                Err(PaymentGatewayError::TradeNoCollision(trade_no)) if trade_no_retries < MAX_TRADE_NO_RETRIES => {
                    debug!("🧾️ Trade number {trade_no} already exists. Generating a new one.");
                    trade_no_retries += 1;
                    order.trade_no = generate_trade_no(Utc::now());
                },
                Err(e) => return Err(e.into()),
            }
        }
        warn!("🧾️ Gave up allocating an amount for {requested} after {MAX_ALLOCATION_ROUNDS} contended rounds");
        Err(OrderFlowError::AllocationExhausted(requested))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn m(minor: i64) -> Money {
        Money::from_minor(minor)
    }

    #[test]
    fn free_amount_is_used_as_is() {
        assert_eq!(pick_amount(m(1000), &[]), Some(m(1000)));
        assert_eq!(pick_amount(m(1000), &[m(1050)]), Some(m(1000)));
    }

    #[test]
    fn next_free_offset_wins() {
        assert_eq!(pick_amount(m(1000), &[m(1000), m(1001)]), Some(m(1002)));
        assert_eq!(pick_amount(m(1000), &[m(1001), m(1000), m(1003)]), Some(m(1002)));
    }

    #[test]
    fn exhausted_after_one_hundred_candidates() {
        let occupied = (1000..1100).map(m).collect::<Vec<_>>();
        assert_eq!(pick_amount(m(1000), &occupied), None);
        let almost = (1000..1099).map(m).collect::<Vec<_>>();
        assert_eq!(pick_amount(m(1000), &almost), Some(m(1099)));
    }

    #[test]
    fn range_covers_ninety_nine_minor_units() {
        assert_eq!(candidate_range(m(1000)), Some((m(1000), m(1099))));
        assert_eq!(candidate_range(m(i64::MAX)), None);
    }
}
