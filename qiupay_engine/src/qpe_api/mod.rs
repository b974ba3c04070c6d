//! # Payment confirmation engine public API
//!
//! The `qpe_api` module exposes the programmatic API of the engine.
//!
//! * [`order_flow_api`] is the primary API. It creates orders (signature check, validation and amount allocation),
//!   answers status queries, and owns every transition out of `Pending`: paid (driven by the matcher), timeout
//!   (driven by the expiry sweep) and canceled (driven by an administrator).
//! * [`order_objects`] holds the request and response types of the order flow.
//!
//! Merchant notifications are handled separately, by [`crate::callbacks::CallbackDispatcher`].
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits it needs.
//!
//! ```rust,ignore
//! use qiupay_engine::{events::EventProducers, OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = OrderFlowApi::new(db, EventProducers::default());
//! let created = api.create_order(&form_params).await?;
//! ```
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
