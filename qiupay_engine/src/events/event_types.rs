use serde::{Deserialize, Serialize};

use crate::db_types::{MatchEvent, Order, OrderStatusType};

/// Emitted once, when a pending order is matched to an observed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub matched: MatchEvent,
}

impl OrderPaidEvent {
    pub fn new(order: Order, matched: MatchEvent) -> Self {
        Self { order, matched }
    }
}

/// Emitted when a pending order leaves the pending set without being paid (timeout or cancellation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    OrderAnnulled(OrderAnnulledEvent),
}
