use log::*;
use qiupay_engine::events::{EventHandlers, EventHooks, OrderAnnulledEvent, OrderPaidEvent};

pub const EVENT_BUFFER_SIZE: usize = 25;

/// Assigns the server's own event handlers.
///
/// 1. OrderPaidEvent: records which transfer paid the order, so the access log and the payment log can be matched up
///    by an operator.
/// 2. OrderAnnulledEvent: records timeouts and cancellations, which is when an amount becomes available again.
pub fn create_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev| {
        let OrderPaidEvent { order, matched } = ev;
        Box::pin(async move {
            info!(
                "📬️ Merchant #{} received {} for order [{}] ({}) from '{}'. Bill {}",
                order.merchant_id,
                matched.amount,
                order.trade_no,
                order.out_trade_no,
                matched.counterparty,
                matched.bill_key
            );
        })
    });
    hooks.on_order_annulled(|ev| {
        let OrderAnnulledEvent { order, status } = ev;
        Box::pin(async move {
            info!(
                "📬️ Order [{}] of merchant #{} was annulled ({status}). {} is available again",
                order.trade_no, order.merchant_id, order.amount
            );
        })
    });
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}
