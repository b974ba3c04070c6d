use crate::{
    db_types::{Order, OrderStatusType},
    traits::BillRecord,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDecision<'a> {
    /// The bill pays none of the pending orders. It stays unconsumed.
    NoMatch,
    Unique(&'a Order),
    /// More than one pending order expects this amount. This breaks the allocation invariant, so it is reported, and
    /// the earliest-created order is chosen.
    Ambiguous { chosen: &'a Order, candidates: usize },
}

impl<'a> MatchDecision<'a> {
    pub fn order(&self) -> Option<&'a Order> {
        match self {
            Self::NoMatch => None,
            Self::Unique(order) => Some(order),
            Self::Ambiguous { chosen, .. } => Some(chosen),
        }
    }
}

/// Finds the pending order that `bill` pays.
///
/// An order is a candidate if it is pending, expects exactly the bill's amount, and the bill was observed inside the
/// order's payment window (`created_at <= observed_at <= expires_at`).
pub fn find_match<'a>(bill: &BillRecord, pending: &'a [Order]) -> MatchDecision<'a> {
    let mut candidates = pending
        .iter()
        .filter(|o| o.status == OrderStatusType::Pending)
        .filter(|o| o.amount == bill.amount)
        .filter(|o| o.accepts_observation_at(bill.observed_at))
        .collect::<Vec<_>>();
    candidates.sort_by_key(|o| (o.created_at, o.id));
    match candidates.as_slice() {
        [] => MatchDecision::NoMatch,
        [only] => MatchDecision::Unique(*only),
        [first, ..] => MatchDecision::Ambiguous { chosen: *first, candidates: candidates.len() },
    }
}
