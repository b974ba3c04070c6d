//! QiuPay Payment Confirmation Engine
//!
//! QiuPay lets small merchants accept payments into a personal payment-provider account. The provider offers no
//! webhooks, so the engine *infers* that an order has been paid: every order is allocated a final amount that is
//! unique among the merchant's pending orders, and the merchant's incoming transfers are polled and matched against
//! those amounts.
//!
//! The library is divided into the following sections:
//! 1. Storage ([`mod@traits`] and, behind the `sqlite` feature, [`SqliteDatabase`]). Backends implement the traits in
//!    [`mod@traits`]. The data types used in the database are defined in [`mod@db_types`] and are public.
//! 2. The public order API ([`OrderFlowApi`]). It creates orders, answers status queries, and owns every transition
//!    out of `Pending`.
//! 3. The background machinery that the host process drives on timers: [`mod@matcher`] polls bill sources and pays
//!    orders, and [`mod@callbacks`] notifies merchants with persisted retries.
//! 4. Outbound HTTP adapters for the bill source and the notifier ([`mod@adapters`]).
//!
//! The engine also publishes events when orders are paid or annulled. See [`mod@events`].
pub mod adapters;
pub mod allocator;
pub mod callbacks;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod matcher;
mod qpe_api;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use qpe_api::{
    errors::OrderFlowError,
    order_flow_api::{OrderFlowApi, DEFAULT_ORDER_TIMEOUT_MINUTES},
    order_objects,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{CallbackManagement, MerchantManagement, PaymentGatewayDatabase, PaymentGatewayError};
