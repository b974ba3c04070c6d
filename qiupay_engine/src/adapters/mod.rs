//! HTTP implementations of the engine's outbound collaborators.
mod http_bill_source;
mod http_notifier;

pub use http_bill_source::HttpBillSource;
pub use http_notifier::HttpNotifier;
