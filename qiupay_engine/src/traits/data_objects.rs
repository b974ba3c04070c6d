use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    db_types::{CallbackJob, MatchEvent, Order, OrderStatusType},
    traits::BillRecord,
};

/// The result of trying to move an order out of `Pending`.
///
/// Exactly one caller ever sees `Committed` for a given order. Everyone else sees `Conflict`, carrying the state the
/// order had already reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome<T = Order> {
    Committed(T),
    Conflict { current: OrderStatusType },
}

impl<T> TransitionOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    pub fn committed(self) -> Option<T> {
        match self {
            Self::Committed(t) => Some(t),
            Self::Conflict { .. } => None,
        }
    }
}

/// Everything needed to commit the pending → paid transition.
#[derive(Debug, Clone)]
pub struct PaidTransition {
    pub order_id: i64,
    pub bill: BillRecord,
    pub paid_at: DateTime<Utc>,
    /// When the first callback attempt falls due
    pub callback_due_at: DateTime<Utc>,
}

/// The rows written by a committed pending → paid transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaidOrder {
    pub order: Order,
    pub matched: MatchEvent,
    pub job: CallbackJob,
}

/// How a callback job moves on after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackJobUpdate {
    Delivered,
    /// The attempt budget is spent
    Failed,
    RetryAt(DateTime<Utc>),
}

/// Result of recording an attempt against a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptRecorded {
    /// The attempt was logged and the job advanced.
    Applied(CallbackJob),
    /// The attempt was logged, but a newer delivery sequence has replaced the one it belonged to, so the job was left
    /// alone.
    Superseded,
}
