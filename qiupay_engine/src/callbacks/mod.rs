//! # Merchant notifications
//!
//! When an order is paid, the merchant is told so by a signed, form-encoded POST to the order's `notify_url`. The
//! merchant acknowledges by answering with the literal body `success`. Anything else is a failed attempt, and the
//! attempt is retried on the [`RetrySchedule`] until it succeeds or the budget of five attempts is spent.
//!
//! * [`schedule`] computes when the next attempt is due.
//! * [`payload`] builds the signed notification parameters and the browser return URL.
//! * [`dispatcher`] claims due jobs, delivers them through a [`crate::traits::Notifier`] and records the results.
pub mod dispatcher;
pub mod payload;
pub mod schedule;

pub use dispatcher::{CallbackDispatcher, DeliveryReport};
pub use payload::{build_return_url, notification_params};
pub use schedule::RetrySchedule;
