//! # QiuPay server
//! This crate hosts the QiuPay payment confirmation engine. It is responsible for:
//! * Accepting signed order requests from merchants and answering order queries.
//! * Running the background workers: the bill poller, the expiry sweep and the callback dispatcher.
//! * Exposing a small, HMAC-protected administrative API.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `POST /submit`: Create an order (form-encoded, signed by the merchant).
//! * `GET /api/order`: Merchant order query, authenticated with the merchant key.
//! * `GET /api/merchant`: Merchant status, balance and order counts, authenticated with the merchant key.
//! * `GET /api/order/status/{trade_no}`: Public order status, for the payment page.
//! * `GET /api/pay/{trade_no}`: Public payment page data.
//! * `POST /admin/orders/{trade_no}/cancel` and `POST /admin/orders/{trade_no}/renotify`: Administrative actions.
pub mod callback_worker;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod event_hooks;
pub mod expiry_worker;
pub mod helpers;
pub mod middleware;
pub mod poller_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
